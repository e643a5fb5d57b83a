//! Derived statistics views.
//!
//! Nothing here is persisted; every value is rebuilt from posture records on
//! request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// One calendar day of monitoring for one user.
///
/// Each record stands for roughly one second of monitoring, so minute counts
/// are `records / 60`, truncated.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub date: NaiveDate,
    pub record_count: u64,
    pub good_minutes: u64,
    pub bad_minutes: u64,
    pub total_minutes: u64,
    pub good_percentage: u32,
    /// Good→bad transitions between adjacent records.
    pub alert_count: u64,
    pub best_angle: f64,
    pub worst_angle: f64,
    pub average_angle: f64,
}

impl DayStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            record_count: 0,
            good_minutes: 0,
            bad_minutes: 0,
            total_minutes: 0,
            good_percentage: 0,
            alert_count: 0,
            best_angle: 0.0,
            worst_angle: 0.0,
            average_angle: 0.0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.record_count > 0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_good_minutes: u64,
    pub total_bad_minutes: u64,
    pub total_minutes: u64,
    pub good_percentage: u32,
    pub total_alerts: u64,
    pub best_day: Option<DayStats>,
    pub worst_day: Option<DayStats>,
    pub daily_stats: Vec<DayStats>,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllTimeStats {
    /// Distinct calendar days with at least one record.
    pub total_days: u64,
    pub total_hours: u64,
    pub total_minutes: u64,
    pub total_records: u64,
    pub good_percentage: u32,
    pub best_day: Option<DayStats>,
    pub worst_day: Option<DayStats>,
    /// Timestamp (ms) of the earliest record.
    pub first_use_at: Option<i64>,
    /// Monitoring minutes per day with data.
    pub average_session_minutes: u64,
    pub total_alerts: u64,
    pub longest_streak_days: u64,
    pub current_streak_days: u64,
}

impl AllTimeStats {
    pub fn empty() -> Self {
        Self {
            total_days: 0,
            total_hours: 0,
            total_minutes: 0,
            total_records: 0,
            good_percentage: 0,
            best_day: None,
            worst_day: None,
            first_use_at: None,
            average_session_minutes: 0,
            total_alerts: 0,
            longest_streak_days: 0,
            current_streak_days: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_records > 0
    }
}

/// Dashboard card for the current day.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodayOverview {
    pub total_records: u64,
    pub good_count: u64,
    pub bad_count: u64,
    pub average_angle: f64,
    pub best_angle: f64,
    pub worst_angle: f64,
    /// Share of good records, not rounded.
    pub good_percentage: f64,
    pub total_minutes: u64,
}
