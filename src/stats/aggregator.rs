//! Pure roll-ups from posture records to day / week / month / all-time views.
//!
//! Every function is a fold over its input; none of them touch storage, so
//! re-running on the same records always yields the same result.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use log::warn;

use crate::db::{PostureRecord, RecordAggregate};

use super::calendar::local_date;
use super::types::{AllTimeStats, DayStats, TodayOverview, Trend, WeekSummary};

/// Records are sampled once per second.
pub const RECORDS_PER_MINUTE: u64 = 60;
/// Days averaged at each end of a window when classifying the trend.
pub const TREND_WINDOW_DAYS: usize = 3;
/// Difference in mean percentage points needed to call a trend.
pub const TREND_MARGIN_POINTS: f64 = 5.0;

/// `round(part / whole * 100)`, or 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

pub fn day_stats(date: NaiveDate, records: &[PostureRecord]) -> DayStats {
    if records.is_empty() {
        return DayStats::empty(date);
    }

    let mut ordered: Vec<&PostureRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.timestamp);

    let good_count = ordered.iter().filter(|r| r.is_good_posture()).count() as u64;
    let bad_count = ordered.len() as u64 - good_count;
    let good_minutes = good_count / RECORDS_PER_MINUTE;
    let bad_minutes = bad_count / RECORDS_PER_MINUTE;
    let total_minutes = good_minutes + bad_minutes;

    let alert_count = ordered
        .windows(2)
        .filter(|pair| pair[0].is_good_posture() && !pair[1].is_good_posture())
        .count() as u64;

    let (best_angle, worst_angle, sum) = ordered.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), record| (min.min(record.angle), max.max(record.angle), sum + record.angle),
    );

    DayStats {
        date,
        record_count: ordered.len() as u64,
        good_minutes,
        bad_minutes,
        total_minutes,
        good_percentage: percentage(good_minutes, total_minutes),
        alert_count,
        best_angle,
        worst_angle,
        average_angle: sum / ordered.len() as f64,
    }
}

/// Compares the mean of the first and last [`TREND_WINDOW_DAYS`] entries.
pub fn trend(percentages: &[u32]) -> Trend {
    if percentages.is_empty() {
        return Trend::Stable;
    }

    let window = TREND_WINDOW_DAYS.min(percentages.len());
    let mean = |values: &[u32]| values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64;
    let first_half = mean(&percentages[..window]);
    let second_half = mean(&percentages[percentages.len() - window..]);

    if second_half > first_half + TREND_MARGIN_POINTS {
        Trend::Improving
    } else if second_half < first_half - TREND_MARGIN_POINTS {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Highest percentage; ties go to the earliest entry.
pub fn best_day(days: &[DayStats]) -> Option<&DayStats> {
    days.iter().fold(None, |best, day| match best {
        Some(current) if current.good_percentage >= day.good_percentage => Some(current),
        _ => Some(day),
    })
}

/// Lowest percentage; ties go to the earliest entry.
pub fn worst_day(days: &[DayStats]) -> Option<&DayStats> {
    days.iter().fold(None, |worst, day| match worst {
        Some(current) if current.good_percentage <= day.good_percentage => Some(current),
        _ => Some(day),
    })
}

/// Folds consecutive days (oldest first) into a week summary.
///
/// Overall percentage comes from summed minutes, not from averaging the daily
/// percentages.
pub fn week_summary(start_date: NaiveDate, end_date: NaiveDate, days: Vec<DayStats>) -> WeekSummary {
    let total_good_minutes: u64 = days.iter().map(|d| d.good_minutes).sum();
    let total_bad_minutes: u64 = days.iter().map(|d| d.bad_minutes).sum();
    let total_minutes = total_good_minutes + total_bad_minutes;
    let total_alerts = days.iter().map(|d| d.alert_count).sum();

    let percentages: Vec<u32> = days.iter().map(|d| d.good_percentage).collect();

    WeekSummary {
        start_date,
        end_date,
        total_good_minutes,
        total_bad_minutes,
        total_minutes,
        good_percentage: percentage(total_good_minutes, total_minutes),
        total_alerts,
        best_day: best_day(&days).cloned(),
        worst_day: worst_day(&days).cloned(),
        trend: trend(&percentages),
        daily_stats: days,
    }
}

/// Keeps only the days that have at least one record.
pub fn month_stats(days: Vec<DayStats>) -> Vec<DayStats> {
    days.into_iter().filter(DayStats::has_data).collect()
}

/// Buckets records by their calendar day in `tz`, preserving input order
/// within each day.
pub fn group_by_day<Tz: TimeZone>(
    tz: &Tz,
    records: Vec<PostureRecord>,
) -> BTreeMap<NaiveDate, Vec<PostureRecord>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<PostureRecord>> = BTreeMap::new();
    for record in records {
        match local_date(tz, record.timestamp) {
            Some(date) => grouped.entry(date).or_default().push(record),
            None => warn!(
                "skipping record {:?} with unrepresentable timestamp {}",
                record.id, record.timestamp
            ),
        }
    }
    grouped
}

/// Folds every day with data into lifetime statistics.
///
/// `days` must be oldest first and contain only days with records.
pub fn all_time_stats(days: Vec<DayStats>, first_use_at: Option<i64>, today: NaiveDate) -> AllTimeStats {
    if days.is_empty() {
        return AllTimeStats::empty();
    }

    let total_days = days.len() as u64;
    let total_minutes: u64 = days.iter().map(|d| d.total_minutes).sum();
    let total_good_minutes: u64 = days.iter().map(|d| d.good_minutes).sum();
    let dates: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();

    AllTimeStats {
        total_days,
        total_hours: total_minutes / 60,
        total_minutes,
        total_records: days.iter().map(|d| d.record_count).sum(),
        good_percentage: percentage(total_good_minutes, total_minutes),
        best_day: best_day(&days).cloned(),
        worst_day: worst_day(&days).cloned(),
        first_use_at,
        average_session_minutes: total_minutes / total_days,
        total_alerts: days.iter().map(|d| d.alert_count).sum(),
        longest_streak_days: longest_streak(&dates),
        current_streak_days: current_streak(&dates, today),
    }
}

/// Longest run of consecutive calendar days in an ascending date list.
pub fn longest_streak(dates: &[NaiveDate]) -> u64 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for date in dates {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*date) => run + 1,
            Some(prev) if prev == *date => run,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*date);
    }

    longest
}

/// Run of consecutive days ending today, or ending yesterday when today has
/// no data yet. Zero otherwise.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> u64 {
    let Some(last) = dates.last().copied() else {
        return 0;
    };
    if last != today && last.succ_opt() != Some(today) {
        return 0;
    }

    let mut streak = 1;
    let mut expected = last;
    for date in dates.iter().rev().skip(1) {
        match expected.pred_opt() {
            Some(prev) if prev == *date => {
                streak += 1;
                expected = prev;
            }
            _ if *date == expected => continue,
            _ => break,
        }
    }
    streak
}

pub fn overview_from_aggregate(aggregate: &RecordAggregate) -> TodayOverview {
    let good_percentage = if aggregate.total > 0 {
        aggregate.good_count as f64 / aggregate.total as f64 * 100.0
    } else {
        0.0
    };

    TodayOverview {
        total_records: aggregate.total,
        good_count: aggregate.good_count,
        bad_count: aggregate.bad_count,
        average_angle: aggregate.avg_angle,
        best_angle: aggregate.min_angle,
        worst_angle: aggregate.max_angle,
        good_percentage,
        total_minutes: aggregate.total / RECORDS_PER_MINUTE,
    }
}

/// Same overview computed from raw records, for stores without an aggregate
/// query.
pub fn overview_from_records(records: &[PostureRecord]) -> TodayOverview {
    let day = day_stats(NaiveDate::MIN, records);
    let good_count = records.iter().filter(|r| r.is_good_posture()).count() as u64;

    overview_from_aggregate(&RecordAggregate {
        total: day.record_count,
        good_count,
        bad_count: day.record_count - good_count,
        avg_angle: day.average_angle,
        min_angle: day.best_angle,
        max_angle: day.worst_angle,
    })
}
