use anyhow::{Context, Result};
use log::warn;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{bool_to_sql, parse_status, to_u64},
    models::{PostureRecord, RecordAggregate},
};

const RECORD_COLUMNS: &str =
    "id, user_id, session_id, angle, status, is_good_posture, timestamp";

fn row_to_record(row: &Row) -> Result<PostureRecord> {
    let id: i64 = row.get("id")?;
    let user_id: i64 = row.get("user_id")?;
    let session_id: String = row.get("session_id")?;
    let angle: f64 = row.get("angle")?;
    let status: String = row.get("status")?;
    let is_good: i64 = row.get("is_good_posture")?;
    let timestamp: i64 = row.get("timestamp")?;

    let stored_status = parse_status(&status)?;
    let record = PostureRecord::capture(user_id, session_id, angle, timestamp).with_id(id);

    if record.status() != stored_status || record.is_good_posture() != (is_good != 0) {
        warn!(
            "record {id} stored as {stored_status}/{is_good} but angle {angle} classifies as {}/{}",
            record.status(),
            record.is_good_posture()
        );
    }

    Ok(record)
}

fn collect_records(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PostureRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

impl Database {
    /// Appends a record and returns its store-assigned id.
    pub async fn insert_posture_record(&self, record: &PostureRecord) -> Result<i64> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO posture_records (user_id, session_id, angle, status, is_good_posture, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id,
                    record.session_id,
                    record.angle,
                    record.status().as_str(),
                    bool_to_sql(record.is_good_posture()),
                    record.timestamp,
                ],
            )
            .with_context(|| "failed to insert posture record")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Most recent `limit` records for a user, newest first.
    pub async fn get_recent_records(&self, user_id: i64, limit: u32) -> Result<Vec<PostureRecord>> {
        self.execute(move |conn| {
            collect_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM posture_records
                     WHERE user_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2"
                ),
                params![user_id, limit],
            )
        })
        .await
    }

    /// All records of one session, newest first.
    pub async fn get_session_records(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Vec<PostureRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            collect_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM posture_records
                     WHERE user_id = ?1 AND session_id = ?2
                     ORDER BY timestamp DESC, id DESC"
                ),
                params![user_id, session_id],
            )
        })
        .await
    }

    /// Records with `start_ms <= timestamp <= end_ms`, oldest first.
    pub async fn get_records_in_range(
        &self,
        user_id: i64,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<PostureRecord>> {
        self.execute(move |conn| {
            collect_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM posture_records
                     WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                     ORDER BY timestamp ASC, id ASC"
                ),
                params![user_id, start_ms, end_ms],
            )
        })
        .await
    }

    /// Every record the user has, oldest first.
    pub async fn get_all_records(&self, user_id: i64) -> Result<Vec<PostureRecord>> {
        self.execute(move |conn| {
            collect_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM posture_records
                     WHERE user_id = ?1
                     ORDER BY timestamp ASC, id ASC"
                ),
                params![user_id],
            )
        })
        .await
    }

    pub async fn get_range_aggregate(
        &self,
        user_id: i64,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<RecordAggregate> {
        self.execute(move |conn| {
            let (total, good, bad, avg, min, max) = conn
                .query_row(
                    "SELECT
                        COUNT(*),
                        COALESCE(SUM(CASE WHEN is_good_posture = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN is_good_posture = 0 THEN 1 ELSE 0 END), 0),
                        AVG(angle),
                        MIN(angle),
                        MAX(angle)
                     FROM posture_records
                     WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
                    params![user_id, start_ms, end_ms],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                            row.get::<_, Option<f64>>(4)?,
                            row.get::<_, Option<f64>>(5)?,
                        ))
                    },
                )
                .with_context(|| "failed to aggregate posture records")?;

            Ok(RecordAggregate {
                total: to_u64(total, "total")?,
                good_count: to_u64(good, "good_count")?,
                bad_count: to_u64(bad, "bad_count")?,
                avg_angle: avg.unwrap_or(0.0),
                min_angle: min.unwrap_or(0.0),
                max_angle: max.unwrap_or(0.0),
            })
        })
        .await
    }

    /// Deletes every record (all users) captured before `cutoff_ms`.
    pub async fn delete_records_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM posture_records WHERE timestamp < ?1",
                    params![cutoff_ms],
                )
                .with_context(|| "failed to delete expired posture records")?;
            Ok(deleted)
        })
        .await
    }
}
