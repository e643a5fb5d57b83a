mod posture_records;
