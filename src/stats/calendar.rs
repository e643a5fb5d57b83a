use chrono::{Datelike, NaiveDate, TimeZone, Utc};

/// First millisecond of `date` in `tz`.
///
/// If local midnight does not exist (DST gap), the first existing hour of the
/// day is used instead.
pub fn start_of_day_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    (0..=3)
        .find_map(|hour| {
            let naive = date.and_hms_opt(hour, 0, 0)?;
            tz.from_local_datetime(&naive).earliest()
        })
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| {
            date.and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
                .unwrap_or(0)
        })
}

/// Inclusive `[start, end]` millisecond bounds of `date` in `tz`.
pub fn day_bounds_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (i64, i64) {
    let start = start_of_day_ms(tz, date);
    let end = match date.succ_opt() {
        Some(next) => start_of_day_ms(tz, next) - 1,
        None => i64::MAX,
    };
    (start, end)
}

pub fn local_date<Tz: TimeZone>(tz: &Tz, timestamp_ms: i64) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(timestamp_ms)
        .earliest()
        .map(|dt| dt.date_naive())
}

/// Days of `year`-`month` from the 1st up to and including `today`.
/// Empty for months that start after `today` or invalid months.
pub fn month_days_until(year: i32, month: u32, today: NaiveDate) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|day| day.month() == month && day.year() == year && *day <= today)
        .collect()
}
