//! Dead-letter-queue retry policy: I/O failures get a bounded number of
//! short, jittered retries before landing in `failed_tasks`; a background
//! loop periodically promotes ready rows back into the index queue with an
//! increasing backoff.

use crate::error::Result;
use rand::Rng;
use rusqlite::Connection;
use sari_model::FailedTask;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential in-process retry backoff for I/O-kind failures, with +/-20%
/// jitter, applied before a task is requeued onto the coalesce queue.
pub fn retry_backoff(attempts: u32) -> Duration {
    let base = if attempts <= 1 { 0.5 } else { 2.0 };
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_secs_f64(base * jitter)
}

/// DLQ re-enqueue ladder: 60s / 300s / 3600s by attempt count.
pub fn dlq_backoff_seconds(attempts: u32) -> i64 {
    let attempts = attempts.max(1);
    match attempts {
        1 => 60,
        2 => 300,
        _ => 3600,
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Builds the `FailedTask` row for a permanently-failing path, truncating
/// the error message the way the reference implementation does (first 500
/// chars) so a pathological error doesn't bloat the DLQ table.
pub fn record_failed_task(db_path: &str, error: &str, attempts: u32) -> FailedTask {
    let safe_attempts = attempts.max(1);
    let now = now_ts();
    let truncated: String = error.chars().take(500).collect();
    FailedTask {
        db_path: db_path.to_string(),
        attempts: safe_attempts,
        last_error: truncated,
        ts: now,
        next_retry_ts: now + dlq_backoff_seconds(safe_attempts),
    }
}

/// Computes the next row for a DLQ task that is being promoted back into
/// the index queue by the poll loop, bumping its attempt count and backoff
/// window.
pub fn promote(task: &FailedTask) -> FailedTask {
    let attempts = task.attempts + 1;
    let now = now_ts();
    FailedTask {
        db_path: task.db_path.clone(),
        attempts,
        last_error: task.last_error.clone(),
        ts: now,
        next_retry_ts: now + dlq_backoff_seconds(attempts),
    }
}

/// Rows whose `next_retry_ts` has elapsed, ready to be promoted back into
/// the index queue (`_dlq_loop`'s `list_failed_tasks_ready` read).
pub fn list_ready(conn: &Connection, now_ts: i64, limit: usize) -> Result<Vec<FailedTask>> {
    let mut stmt = conn.prepare(
        "SELECT path, attempts, error, ts, next_retry FROM failed_tasks \
         WHERE next_retry <= ?1 ORDER BY next_retry ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![now_ts, limit as i64], |row| {
        Ok(FailedTask {
            db_path: row.get(0)?,
            attempts: row.get(1)?,
            last_error: row.get(2)?,
            ts: row.get(3)?,
            next_retry_ts: row.get(4)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ladder_matches_attempt_thresholds() {
        assert_eq!(dlq_backoff_seconds(1), 60);
        assert_eq!(dlq_backoff_seconds(2), 300);
        assert_eq!(dlq_backoff_seconds(3), 3600);
        assert_eq!(dlq_backoff_seconds(10), 3600);
    }

    #[test]
    fn retry_backoff_is_bounded_by_jitter_window() {
        let first = retry_backoff(1);
        assert!(first >= Duration::from_secs_f64(0.4) && first <= Duration::from_secs_f64(0.6));
        let second = retry_backoff(2);
        assert!(second >= Duration::from_secs_f64(1.6) && second <= Duration::from_secs_f64(2.4));
    }

    #[test]
    fn record_failed_task_truncates_long_errors() {
        let long_error = "x".repeat(1000);
        let task = record_failed_task("r1/a.py", &long_error, 1);
        assert_eq!(task.last_error.len(), 500);
        assert_eq!(task.next_retry_ts - task.ts, 60);
    }

    #[test]
    fn promote_bumps_attempts_and_widens_backoff() {
        let task = record_failed_task("r1/a.py", "boom", 1);
        let promoted = promote(&task);
        assert_eq!(promoted.attempts, 2);
        assert_eq!(promoted.next_retry_ts - promoted.ts, 300);
    }

    #[test]
    fn list_ready_only_returns_elapsed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        sari_storage::schema::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO failed_tasks (path, root_id, attempts, error, ts, next_retry) VALUES \
             ('r1/a.py', 'r1', 1, 'boom', 0, 10), ('r1/b.py', 'r1', 1, 'boom', 0, 1000)",
            [],
        )
        .unwrap();

        let ready = list_ready(&conn, 500, 10).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].db_path, "r1/a.py");
    }
}
