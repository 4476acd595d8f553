//! Per-task-kind SQL, applied inside the writer's single transaction, as
//! typed `rusqlite::Transaction` helpers.

use crate::error::Result;
use crate::tasks::{Context, RepoMeta, Snippet};
use rusqlite::{params, Transaction};
use sari_model::{FailedTask, FileRecord, Relation, Symbol};
use std::collections::HashSet;

pub fn delete_path(tx: &Transaction, db_path: &str) -> Result<()> {
    tx.execute("DELETE FROM files WHERE path = ?1", [db_path])?;
    tx.execute("DELETE FROM symbols WHERE path = ?1", [db_path])?;
    tx.execute(
        "DELETE FROM symbol_relations WHERE from_path = ?1 OR to_path = ?1",
        [db_path],
    )?;
    tx.execute("DELETE FROM failed_tasks WHERE path = ?1", [db_path])?;
    Ok(())
}

/// Filter out rows whose `db_path` is also being deleted in this batch: the
/// delete phase always runs first, so any upsert for the same path in the
/// same batch would otherwise race the cascade.
pub fn filter_deleted<'a>(rows: &'a [FileRecord], deleted: &HashSet<String>) -> Vec<&'a FileRecord> {
    rows.iter().filter(|r| !deleted.contains(&r.db_path)).collect()
}

pub fn upsert_files(tx: &Transaction, rows: &[&FileRecord]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO files (
            path, rel_path, root_id, repo, mtime, size, content, hash, fts_content,
            last_seen_ts, deleted_ts, parse_status, parse_reason, ast_status, ast_reason,
            is_binary, is_minified, metadata_json
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
        ON CONFLICT(path) DO UPDATE SET
            rel_path=excluded.rel_path, root_id=excluded.root_id, repo=excluded.repo,
            mtime=excluded.mtime, size=excluded.size, content=excluded.content,
            hash=excluded.hash, fts_content=excluded.fts_content,
            last_seen_ts=excluded.last_seen_ts, deleted_ts=excluded.deleted_ts,
            parse_status=excluded.parse_status, parse_reason=excluded.parse_reason,
            ast_status=excluded.ast_status, ast_reason=excluded.ast_reason,
            is_binary=excluded.is_binary, is_minified=excluded.is_minified,
            metadata_json=excluded.metadata_json",
    )?;
    for row in rows {
        stmt.execute(params![
            row.db_path,
            row.rel_path,
            row.root_id,
            row.repo,
            row.mtime,
            row.size as i64,
            row.content,
            row.hash,
            row.fts_content,
            row.last_seen_ts,
            row.deleted_ts,
            status_str(row.parse_status),
            row.parse_reason.as_str(),
            ast_status_str(row.ast_status),
            row.ast_reason.as_str(),
            row.is_binary as i64,
            row.is_minified as i64,
            row.metadata.to_string(),
        ])?;
    }
    Ok(())
}

/// Bulk-load variant of `upsert_files`: targets the in-memory staging table
/// instead of `files`, so a cold-start scan can load every row with a single
/// `INSERT OR REPLACE` fold-in afterward instead of one upsert per row.
pub fn insert_staging_files(tx: &Transaction, rows: &[&FileRecord]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO staging.files_staging (
            path, rel_path, root_id, repo, mtime, size, content, hash, fts_content,
            last_seen_ts, deleted_ts, parse_status, parse_reason, ast_status, ast_reason,
            is_binary, is_minified, metadata_json
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.db_path,
            row.rel_path,
            row.root_id,
            row.repo,
            row.mtime,
            row.size as i64,
            row.content,
            row.hash,
            row.fts_content,
            row.last_seen_ts,
            row.deleted_ts,
            status_str(row.parse_status),
            row.parse_reason.as_str(),
            ast_status_str(row.ast_status),
            row.ast_reason.as_str(),
            row.is_binary as i64,
            row.is_minified as i64,
            row.metadata.to_string(),
        ])?;
    }
    Ok(())
}

/// Folds the staging table into `files` and clears it, within the caller's
/// already-open transaction.
pub fn fold_staging_into_files(tx: &Transaction) -> Result<()> {
    tx.execute_batch(
        "INSERT OR REPLACE INTO main.files SELECT * FROM staging.files_staging;
         DELETE FROM staging.files_staging;",
    )?;
    Ok(())
}

fn status_str(status: sari_model::ParseStatus) -> &'static str {
    match status {
        sari_model::ParseStatus::Ok => "ok",
        sari_model::ParseStatus::Skipped => "skipped",
    }
}

fn ast_status_str(status: sari_model::AstStatus) -> &'static str {
    match status {
        sari_model::AstStatus::Ok => "ok",
        sari_model::AstStatus::Skipped => "skipped",
        sari_model::AstStatus::Timeout => "timeout",
        sari_model::AstStatus::None => "none",
    }
}

pub fn upsert_symbols(tx: &Transaction, rows: &[Symbol]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO symbols (
            symbol_id, path, root_id, name, kind, line, end_line, content, parent,
            meta_json, doc_comment, qualname, importance_score
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
        ON CONFLICT(symbol_id) DO UPDATE SET
            path=excluded.path, root_id=excluded.root_id, name=excluded.name,
            kind=excluded.kind, line=excluded.line, end_line=excluded.end_line,
            content=excluded.content, parent=excluded.parent, meta_json=excluded.meta_json,
            doc_comment=excluded.doc_comment, qualname=excluded.qualname,
            importance_score=excluded.importance_score",
    )?;
    for row in rows {
        stmt.execute(params![
            row.symbol_id,
            row.db_path,
            row.root_id,
            row.name,
            row.kind.as_str(),
            row.line,
            row.end_line,
            row.content,
            row.parent,
            row.meta.to_string(),
            row.doc,
            row.qualname,
            row.importance_score,
        ])?;
    }
    Ok(())
}

pub fn upsert_relations(tx: &Transaction, rows: &[Relation]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO symbol_relations (
            from_path, from_root_id, from_symbol, from_symbol_id,
            to_path, to_root_id, to_symbol, to_symbol_id, rel_type, line, meta_json
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
        ON CONFLICT(from_path, from_root_id, from_symbol, IFNULL(from_symbol_id, ''),
                     to_path, to_root_id, to_symbol, IFNULL(to_symbol_id, ''),
                     rel_type, IFNULL(line, -1), IFNULL(meta_json, ''))
        DO NOTHING",
    )?;
    for row in rows {
        stmt.execute(params![
            row.from_path,
            row.from_root_id,
            row.from_symbol,
            row.from_symbol_id,
            row.to_path,
            row.to_root_id,
            row.to_symbol,
            row.to_symbol_id,
            row.rel_type.as_str(),
            row.line,
            row.meta.to_string(),
        ])?;
    }
    Ok(())
}

pub fn update_last_seen(tx: &Transaction, db_paths: &[String], ts: i64) -> Result<()> {
    let mut stmt = tx.prepare_cached("UPDATE files SET last_seen_ts = ?1 WHERE path = ?2")?;
    for path in db_paths {
        stmt.execute(params![ts, path])?;
    }
    Ok(())
}

pub fn upsert_repo_meta(tx: &Transaction, rows: &[RepoMeta]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO meta_stats (key, value, updated_ts) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ts = excluded.updated_ts",
    )?;
    let now = now_ts();
    for row in rows {
        let key = format!("{}:{}", row.root_id, row.key);
        stmt.execute(params![key, row.value.to_string(), now])?;
    }
    Ok(())
}

pub fn upsert_snippets(tx: &Transaction, rows: &[Snippet]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO snippets (
            tag, path, root_id, start_line, end_line, content, note, created_ts, updated_ts
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)
        ON CONFLICT(tag, root_id, path, start_line, end_line) DO UPDATE SET
            content=excluded.content, note=excluded.note, updated_ts=excluded.updated_ts",
    )?;
    let now = now_ts();
    for row in rows {
        stmt.execute(params![
            row.tag,
            row.path,
            row.root_id,
            row.start_line,
            row.end_line,
            row.content,
            row.note,
            now,
        ])?;
    }
    Ok(())
}

pub fn upsert_contexts(tx: &Transaction, rows: &[Context]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO contexts (topic, content, tags_json, created_ts, updated_ts)
         VALUES (?1,?2,?3,?4,?4)
         ON CONFLICT(topic) DO UPDATE SET
            content=excluded.content, tags_json=excluded.tags_json, updated_ts=excluded.updated_ts",
    )?;
    let now = now_ts();
    for row in rows {
        let tags_json = serde_json::to_string(&row.tags).unwrap_or_else(|_| "[]".into());
        stmt.execute(params![row.topic, row.content, tags_json, now])?;
    }
    Ok(())
}

pub fn dlq_upsert(tx: &Transaction, rows: &[FailedTask]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO failed_tasks (path, root_id, attempts, error, ts, next_retry)
         VALUES (?1,?2,?3,?4,?5,?6)
         ON CONFLICT(path) DO UPDATE SET
            attempts=excluded.attempts, error=excluded.error, ts=excluded.ts,
            next_retry=excluded.next_retry",
    )?;
    for row in rows {
        let root_id = row.db_path.split('/').next().unwrap_or("");
        stmt.execute(params![
            row.db_path,
            root_id,
            row.attempts,
            row.last_error,
            row.ts,
            row.next_retry_ts,
        ])?;
    }
    Ok(())
}

pub fn dlq_clear(tx: &Transaction, db_paths: &[String]) -> Result<()> {
    let mut stmt = tx.prepare_cached("DELETE FROM failed_tasks WHERE path = ?1")?;
    for path in db_paths {
        stmt.execute([path])?;
    }
    Ok(())
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
