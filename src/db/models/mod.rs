pub mod posture_record;

pub use posture_record::{PostureRecord, RecordAggregate};
