//! Connection bootstrap: pragmas, schema init, and the turbo staging path.
//!
//! WAL journaling + `synchronous=NORMAL` + a 15s busy-timeout + ~10MB cache.

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(15))?;
    conn.pragma_update(None, "cache_size", -10_000i64)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Attach an in-memory staging database for the turbo bulk-load path:
/// callers `INSERT OR REPLACE` into `staging.files_staging`, then
/// `finalize_turbo_batch` folds it into `main.files` under one transaction.
/// Called once per connection at writer startup; safe to call again since
/// the staging table is created with `IF NOT EXISTS`, but a second `ATTACH`
/// of the same alias will error.
pub fn attach_staging(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "ATTACH DATABASE ':memory:' AS staging;
         CREATE TABLE IF NOT EXISTS staging.files_staging (
            path TEXT PRIMARY KEY,
            rel_path TEXT NOT NULL,
            root_id TEXT NOT NULL,
            repo TEXT,
            mtime INTEGER NOT NULL,
            size INTEGER NOT NULL,
            content BLOB,
            hash TEXT,
            fts_content TEXT,
            last_seen_ts INTEGER DEFAULT 0,
            deleted_ts INTEGER DEFAULT 0,
            parse_status TEXT DEFAULT 'ok',
            parse_reason TEXT DEFAULT 'none',
            ast_status TEXT DEFAULT 'none',
            ast_reason TEXT DEFAULT 'none',
            is_binary INTEGER DEFAULT 0,
            is_minified INTEGER DEFAULT 0,
            metadata_json TEXT DEFAULT '{}'
         );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let conn = open_in_memory().unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, crate::schema::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn turbo_path_folds_staging_into_main() {
        let conn = open_in_memory().unwrap();
        attach_staging(&conn).unwrap();
        conn.execute(
            "INSERT INTO staging.files_staging (path, rel_path, root_id, mtime, size)
             VALUES ('r1/a.py', 'a.py', 'r1', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute_batch(
            "INSERT OR REPLACE INTO main.files SELECT * FROM staging.files_staging;
             DELETE FROM staging.files_staging;",
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM main.files WHERE path='r1/a.py'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let staging_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM staging.files_staging", [], |r| r.get(0))
            .unwrap();
        assert_eq!(staging_count, 0);
    }
}
