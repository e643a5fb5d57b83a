use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order. Step `n` (1-based) brings `user_version` from
/// `n - 1` to `n`; append new steps, never edit shipped ones.
const STEPS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

pub fn schema_version() -> i32 {
    STEPS.len() as i32
}

fn stored_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Applies every pending step inside one transaction. A store written by a
/// newer build is refused rather than guessed at.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let target = schema_version();
    let stored = stored_version(conn)?;

    if stored > target {
        bail!("posture store is at schema {stored}, this build only knows up to {target}");
    }
    let pending = &STEPS[stored as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(stored_version(&conn).unwrap(), schema_version());
        let indexed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'posture_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(indexed >= 1);
    }

    #[test]
    fn refuses_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", schema_version() + 1)
            .unwrap();
        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("only knows up to"));
    }
}
