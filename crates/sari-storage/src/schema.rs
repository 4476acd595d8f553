//! Table definitions and idempotent version migrations.
//!
//! Migration steps: v2 adds `importance_score`, v3 adds root stats +
//! `meta_stats`, v4 adds `snippet_versions`, v5 adds a `symbol_relations`
//! dedup unique index. Each step is guarded by a prior `SELECT ... LIMIT 1`
//! probe for the column rather than catching the duplicate-column error,
//! since rusqlite surfaces that as an opaque `SqliteFailure`.

use crate::error::{Result, StorageError};
use rusqlite::Connection;

pub const CURRENT_SCHEMA_VERSION: i64 = 5;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let has_version_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);

    if !has_version_table {
        create_all_tables(conn)?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_ts) VALUES (?1, ?2)",
            rusqlite::params![CURRENT_SCHEMA_VERSION, now_ts()],
        )?;
    } else {
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(1);

        if version < 2 {
            add_column_if_missing(conn, "symbols", "importance_score", "REAL DEFAULT 0.0")?;
        }
        if version < 3 {
            add_column_if_missing(conn, "roots", "file_count", "INTEGER DEFAULT 0")?;
            add_column_if_missing(conn, "roots", "symbol_count", "INTEGER DEFAULT 0")?;
            create_meta_stats_table(conn)?;
        }
        if version < 4 {
            create_snippet_versions_table(conn)?;
        }
        if version < 5 {
            deduplicate_symbol_relations(conn)?;
            create_symbol_relations_indexes(conn)?;
        }

        // Recovery probes: re-create/backfill anything a partial upgrade left out.
        if !table_has_column(conn, "files", "metadata_json") {
            add_column_if_missing(conn, "files", "metadata_json", "TEXT DEFAULT '{}'")?;
        }
        if !table_exists(conn, "snippet_versions") {
            create_snippet_versions_table(conn)?;
        }

        conn.execute(
            "UPDATE schema_version SET version = ?1",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }

    init_fts(conn)?;
    Ok(())
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> bool {
    conn.query_row(&format!("SELECT {column} FROM {table} LIMIT 1"), [], |_| {
        Ok(true)
    })
    .unwrap_or(false)
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl_type: &str,
) -> Result<()> {
    if table_has_column(conn, table, column) {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type}"),
        [],
    )
    .map_err(|e| StorageError::migration(format!("adding {table}.{column}: {e}")))?;
    Ok(())
}

fn create_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_ts INTEGER NOT NULL
        );",
    )?;
    create_roots_table(conn)?;
    create_files_table(conn)?;
    create_symbols_table(conn)?;
    create_symbol_relations_table(conn)?;
    create_snippets_table(conn)?;
    create_snippet_versions_table(conn)?;
    create_failed_tasks_table(conn)?;
    create_meta_stats_table(conn)?;
    Ok(())
}

fn create_roots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS roots (
            root_id TEXT PRIMARY KEY,
            root_path TEXT NOT NULL,
            real_path TEXT,
            last_scan_ts INTEGER DEFAULT 0,
            file_count INTEGER DEFAULT 0,
            symbol_count INTEGER DEFAULT 0,
            config_json TEXT,
            label TEXT,
            state TEXT DEFAULT 'ready',
            created_ts INTEGER,
            updated_ts INTEGER
        );",
    )?;
    Ok(())
}

fn create_files_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
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
            metadata_json TEXT DEFAULT '{}',
            FOREIGN KEY(root_id) REFERENCES roots(root_id)
        );
        CREATE INDEX IF NOT EXISTS idx_files_root ON files(root_id);
        CREATE INDEX IF NOT EXISTS idx_files_rel_path ON files(rel_path);",
    )?;
    Ok(())
}

fn create_symbols_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbols (
            symbol_id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            root_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            content TEXT,
            parent TEXT,
            meta_json TEXT,
            doc_comment TEXT,
            qualname TEXT,
            importance_score REAL DEFAULT 0.0,
            FOREIGN KEY(path) REFERENCES files(path) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_symbols_path ON symbols(path);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);",
    )?;
    Ok(())
}

fn create_symbol_relations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbol_relations (
            from_path TEXT NOT NULL,
            from_root_id TEXT NOT NULL,
            from_symbol TEXT NOT NULL,
            from_symbol_id TEXT,
            to_path TEXT NOT NULL,
            to_root_id TEXT NOT NULL,
            to_symbol TEXT NOT NULL,
            to_symbol_id TEXT,
            rel_type TEXT NOT NULL,
            line INTEGER,
            meta_json TEXT
        );",
    )?;
    create_symbol_relations_indexes(conn)
}

fn create_symbol_relations_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_symbol_relations_identity
         ON symbol_relations(
            from_path, from_root_id, from_symbol, IFNULL(from_symbol_id, ''),
            to_path, to_root_id, to_symbol, IFNULL(to_symbol_id, ''),
            rel_type, IFNULL(line, -1), IFNULL(meta_json, '')
         );
         CREATE INDEX IF NOT EXISTS idx_symbol_relations_to_symbol ON symbol_relations(to_symbol);
         CREATE INDEX IF NOT EXISTS idx_symbol_relations_to_symbol_id ON symbol_relations(to_symbol_id);
         CREATE INDEX IF NOT EXISTS idx_symbol_relations_from_symbol ON symbol_relations(from_symbol);
         CREATE INDEX IF NOT EXISTS idx_symbol_relations_from_symbol_id ON symbol_relations(from_symbol_id);",
    )?;
    Ok(())
}

fn deduplicate_symbol_relations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM symbol_relations
         WHERE rowid NOT IN (
            SELECT MIN(rowid) FROM symbol_relations
            GROUP BY from_path, from_root_id, from_symbol, IFNULL(from_symbol_id, ''),
                     to_path, to_root_id, to_symbol, IFNULL(to_symbol_id, ''),
                     rel_type, IFNULL(line, -1), IFNULL(meta_json, '')
         );",
    )?;
    Ok(())
}

fn create_snippets_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snippets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag TEXT NOT NULL,
            path TEXT NOT NULL,
            root_id TEXT NOT NULL,
            start_line INTEGER,
            end_line INTEGER,
            content TEXT,
            content_hash TEXT,
            anchor_before TEXT,
            anchor_after TEXT,
            repo TEXT,
            note TEXT,
            commit_hash TEXT,
            created_ts INTEGER NOT NULL,
            updated_ts INTEGER NOT NULL,
            metadata_json TEXT,
            FOREIGN KEY(root_id) REFERENCES roots(root_id),
            UNIQUE(tag, root_id, path, start_line, end_line)
        );",
    )?;
    Ok(())
}

fn create_snippet_versions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snippet_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snippet_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT,
            created_ts INTEGER NOT NULL,
            FOREIGN KEY(snippet_id) REFERENCES snippets(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_snippet_versions_snippet_id ON snippet_versions(snippet_id);",
    )?;
    Ok(())
}

fn create_failed_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS failed_tasks (
            path TEXT PRIMARY KEY,
            root_id TEXT NOT NULL,
            attempts INTEGER DEFAULT 0,
            error TEXT,
            ts INTEGER,
            next_retry INTEGER,
            metadata_json TEXT,
            FOREIGN KEY(root_id) REFERENCES roots(root_id)
        );",
    )?;
    Ok(())
}

fn create_meta_stats_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta_stats (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_ts INTEGER
        );",
    )?;
    Ok(())
}

fn init_fts(conn: &Connection) -> Result<()> {
    if table_exists(conn, "files_fts") {
        return Ok(());
    }
    conn.execute_batch(
        "CREATE VIRTUAL TABLE files_fts USING fts5(
            path, rel_path, fts_content, content='files', content_rowid='rowid'
         );
         CREATE TRIGGER files_ai AFTER INSERT ON files BEGIN
            INSERT INTO files_fts(rowid, path, rel_path, fts_content)
            VALUES (new.rowid, new.path, new.rel_path, new.fts_content);
         END;
         CREATE TRIGGER files_ad AFTER DELETE ON files BEGIN
            INSERT INTO files_fts(files_fts, rowid, path, rel_path, fts_content)
            VALUES('delete', old.rowid, old.path, old.rel_path, old.fts_content);
         END;
         CREATE TRIGGER files_au AFTER UPDATE ON files BEGIN
            INSERT INTO files_fts(files_fts, rowid, path, rel_path, fts_content)
            VALUES('delete', old.rowid, old.path, old.rel_path, old.fts_content);
            INSERT INTO files_fts(rowid, path, rel_path, fts_content)
            VALUES (new.rowid, new.path, new.rel_path, new.fts_content);
         END;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_db_gets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert!(table_exists(&conn, "files_fts"));
    }

    #[test]
    fn v1_db_migrates_forward() {
        let conn = Connection::open_in_memory().unwrap();
        // Simulate a v1 database: no importance_score, no meta_stats, no
        // snippet_versions, no file_count/symbol_count on roots.
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_ts INTEGER NOT NULL);
             INSERT INTO schema_version (version, applied_ts) VALUES (1, 0);",
        )
        .unwrap();
        create_roots_table(&conn).unwrap();
        create_files_table(&conn).unwrap();
        conn.execute_batch(
            "CREATE TABLE symbols (symbol_id TEXT PRIMARY KEY, path TEXT, root_id TEXT, name TEXT,
                kind TEXT, line INTEGER, end_line INTEGER, content TEXT, parent TEXT,
                meta_json TEXT, doc_comment TEXT, qualname TEXT);",
        )
        .unwrap();
        create_symbol_relations_table(&conn).unwrap();
        create_snippets_table(&conn).unwrap();
        create_failed_tasks_table(&conn).unwrap();

        init_schema(&conn).unwrap();

        assert!(table_has_column(&conn, "symbols", "importance_score"));
        assert!(table_has_column(&conn, "roots", "file_count"));
        assert!(table_exists(&conn, "meta_stats"));
        assert!(table_exists(&conn, "snippet_versions"));
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }
}
