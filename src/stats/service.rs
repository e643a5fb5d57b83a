use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, TimeZone};

use crate::db::{Database, PostureRecord};

use super::aggregator;
use super::calendar::{day_bounds_ms, month_days_until};
use super::types::{AllTimeStats, DayStats, TodayOverview, WeekSummary};

/// Records shown in the live chart.
pub const CHART_RECORD_LIMIT: u32 = 30;
/// Records shown in the current-session history list.
pub const SESSION_HISTORY_LIMIT: usize = 15;
pub const WEEK_DAYS: i64 = 7;

/// Read side of the pipeline: every view is recomputed from the store on
/// each call, so it is safe to run alongside the acquisition writer.
#[derive(Clone)]
pub struct StatsService<Tz: TimeZone = Local> {
    db: Database,
    tz: Tz,
}

impl StatsService<Local> {
    pub fn local(db: Database) -> Self {
        Self::new(db, Local)
    }
}

impl<Tz: TimeZone> StatsService<Tz> {
    pub fn new(db: Database, tz: Tz) -> Self {
        Self { db, tz }
    }

    /// Today's calendar date in the service's time zone.
    pub fn today(&self) -> NaiveDate {
        chrono::Utc::now().with_timezone(&self.tz).date_naive()
    }

    pub async fn day_stats(&self, user_id: i64, date: NaiveDate) -> Result<DayStats> {
        let (start, end) = day_bounds_ms(&self.tz, date);
        let records = self
            .db
            .get_records_in_range(user_id, start, end)
            .await
            .with_context(|| format!("failed to load records for {date}"))?;
        Ok(aggregator::day_stats(date, &records))
    }

    /// Seven calendar days ending on `today`, oldest first.
    pub async fn week_summary(&self, user_id: i64, today: NaiveDate) -> Result<WeekSummary> {
        let start_date = today - Duration::days(WEEK_DAYS - 1);
        let (range_start, _) = day_bounds_ms(&self.tz, start_date);
        let (_, range_end) = day_bounds_ms(&self.tz, today);

        let records = self
            .db
            .get_records_in_range(user_id, range_start, range_end)
            .await
            .context("failed to load records for week summary")?;
        let mut grouped = aggregator::group_by_day(&self.tz, records);

        let days = start_date
            .iter_days()
            .take(WEEK_DAYS as usize)
            .map(|date| match grouped.remove(&date) {
                Some(records) => aggregator::day_stats(date, &records),
                None => DayStats::empty(date),
            })
            .collect();

        Ok(aggregator::week_summary(start_date, today, days))
    }

    /// Days of the month with data, never looking past `today`.
    pub async fn month_stats(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
        today: NaiveDate,
    ) -> Result<Vec<DayStats>> {
        let dates = month_days_until(year, month, today);
        let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
            return Ok(Vec::new());
        };

        let (range_start, _) = day_bounds_ms(&self.tz, *first);
        let (_, range_end) = day_bounds_ms(&self.tz, *last);
        let records = self
            .db
            .get_records_in_range(user_id, range_start, range_end)
            .await
            .with_context(|| format!("failed to load records for {year}-{month:02}"))?;
        let mut grouped = aggregator::group_by_day(&self.tz, records);

        let days = dates
            .into_iter()
            .map(|date| match grouped.remove(&date) {
                Some(records) => aggregator::day_stats(date, &records),
                None => DayStats::empty(date),
            })
            .collect();

        Ok(aggregator::month_stats(days))
    }

    pub async fn all_time_stats(&self, user_id: i64, today: NaiveDate) -> Result<AllTimeStats> {
        let records = self
            .db
            .get_all_records(user_id)
            .await
            .context("failed to load records for all-time stats")?;

        let first_use_at = records.iter().map(|r| r.timestamp).min();
        let days = aggregator::group_by_day(&self.tz, records)
            .into_iter()
            .map(|(date, records)| aggregator::day_stats(date, &records))
            .collect();

        Ok(aggregator::all_time_stats(days, first_use_at, today))
    }

    pub async fn today_overview(&self, user_id: i64, today: NaiveDate) -> Result<TodayOverview> {
        let (start, end) = day_bounds_ms(&self.tz, today);
        let aggregate = self
            .db
            .get_range_aggregate(user_id, start, end)
            .await
            .context("failed to aggregate today's records")?;
        Ok(aggregator::overview_from_aggregate(&aggregate))
    }

    /// Most recent records for the live chart, oldest first.
    pub async fn chart_records(&self, user_id: i64) -> Result<Vec<PostureRecord>> {
        let mut records = self
            .db
            .get_recent_records(user_id, CHART_RECORD_LIMIT)
            .await
            .context("failed to load chart records")?;
        records.reverse();
        Ok(records)
    }

    /// Latest records of one session, newest first.
    pub async fn session_history(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Vec<PostureRecord>> {
        let mut records = self
            .db
            .get_session_records(user_id, session_id)
            .await
            .with_context(|| format!("failed to load history for session {session_id}"))?;
        records.truncate(SESSION_HISTORY_LIMIT);
        Ok(records)
    }
}
