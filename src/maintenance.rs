//! Record retention. Runs off the acquisition path: once at startup, then on
//! a slow timer.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info};
use tokio::{task::JoinHandle, time};

use crate::db::Database;

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: u32,
}

impl RetentionPolicy {
    pub fn days(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Records captured strictly before this instant are expired.
    pub fn cutoff_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(i64::from(self.retention_days).saturating_mul(DAY_MS))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::days(DEFAULT_RETENTION_DAYS)
    }
}

pub async fn prune_expired_records(
    db: &Database,
    policy: RetentionPolicy,
    now_ms: i64,
) -> Result<usize> {
    let cutoff = policy.cutoff_ms(now_ms);
    let deleted = db
        .delete_records_older_than(cutoff)
        .await
        .with_context(|| format!("failed to prune records older than {cutoff}"))?;

    info!(
        "Retention: removed {deleted} posture records older than {} days",
        policy.retention_days
    );
    Ok(deleted)
}

/// Prunes immediately, then every [`PRUNE_INTERVAL`]. Failures are logged and
/// retried on the next run.
pub fn spawn_retention_task(db: Database, policy: RetentionPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(err) = prune_expired_records(&db, policy, Utc::now().timestamp_millis()).await
            {
                error!("Retention run failed: {err:?}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PostureRecord;
    use tempfile::TempDir;

    const NOW: i64 = 1_710_028_800_000;

    #[test]
    fn cutoff_is_retention_days_before_now() {
        assert_eq!(RetentionPolicy::days(30).cutoff_ms(NOW), NOW - 30 * DAY_MS);
        assert_eq!(RetentionPolicy::default().retention_days, 30);
        assert_eq!(RetentionPolicy::days(1).cutoff_ms(0), -DAY_MS);
    }

    #[tokio::test]
    async fn prunes_only_expired_records() {
        let tmp_dir = TempDir::new().unwrap();
        let db = Database::new(tmp_dir.path().join("retention.sqlite3")).unwrap();
        let policy = RetentionPolicy::days(30);
        let cutoff = policy.cutoff_ms(NOW);

        for ts in [cutoff - 1, cutoff, cutoff + 1, NOW] {
            db.insert_posture_record(&PostureRecord::capture(1, "S", 10.0, ts))
                .await
                .unwrap();
        }

        assert_eq!(prune_expired_records(&db, policy, NOW).await.unwrap(), 1);
        let remaining: Vec<i64> = db
            .get_all_records(1)
            .await
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(remaining, vec![cutoff, cutoff + 1, NOW]);

        // Nothing left to prune.
        assert_eq!(prune_expired_records(&db, policy, NOW).await.unwrap(), 0);
    }
}
