//! Directory scan: walks every registered root, classifies each file, diffs
//! it against the last known `(mtime, size, hash)` held in the database, and
//! turns the result into DB writer tasks. Paths not seen during the walk are
//! soft-deleted: one `DeletePath` task per db-path not observed this pass.

use crate::classify::{classify_file, ClassifyResult, SizeLimits};
use crate::error::Result;
use crate::redact::redact;
use globset::GlobSet;
use rusqlite::Connection;
use sari_model::config::Utf8DecodePolicy;
use sari_model::{db_path, FileRecord};
use sari_parsing::ParserRegistry;
use sari_storage::{DbTask, EngineDoc, TaskKind};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct ExistingFileMeta {
    pub mtime: i64,
    pub size: i64,
    pub deleted_ts: i64,
    pub hash: Option<String>,
}

/// Reads the current `(mtime, size, deleted_ts, hash)` for every file under a
/// root, via a plain read-only connection.
pub fn load_existing(conn: &Connection, root_id: &str) -> Result<HashMap<String, ExistingFileMeta>> {
    let mut stmt =
        conn.prepare("SELECT path, mtime, size, deleted_ts, hash FROM files WHERE root_id = ?1")?;
    let rows = stmt.query_map([root_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ExistingFileMeta {
                mtime: row.get(1)?,
                size: row.get(2)?,
                deleted_ts: row.get(3)?,
                hash: row.get(4)?,
            },
        ))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (path, meta) = row?;
        out.insert(path, meta);
    }
    Ok(out)
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files_seen: usize,
    pub files_changed: usize,
    pub files_deleted: usize,
    pub tasks: Vec<DbTask>,
}

#[allow(clippy::too_many_arguments)]
pub fn scan_once(
    conn: &Connection,
    registry: &ParserRegistry,
    root_id: &str,
    root_path: &Path,
    repo: &str,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
    limits: SizeLimits,
    decode_policy: Utf8DecodePolicy,
    sampling_enabled: bool,
) -> Result<ScanOutcome> {
    let existing = load_existing(conn, root_id)?;
    let cold_start = existing.is_empty();
    let mut seen_paths: HashMap<String, bool> = HashMap::new();
    let mut outcome = ScanOutcome::default();
    let mut bulk_rows: Vec<FileRecord> = Vec::new();
    let mut bulk_docs: Vec<EngineDoc> = Vec::new();

    for entry in WalkDir::new(root_path)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = match entry.path().strip_prefix(root_path) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let size = metadata.len();
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let db = db_path(root_id, &rel_path);
        let key = db.as_str().to_string();
        seen_paths.insert(key.clone(), true);
        outcome.files_seen += 1;

        if let Some(prev) = existing.get(&key) {
            if prev.deleted_ts == 0 && prev.mtime == mtime && prev.size as u64 == size {
                outcome.tasks.push(DbTask::new(TaskKind::UpdateLastSeen {
                    db_paths: vec![key],
                    ts: now_ts(),
                }));
                continue;
            }
        }

        let classified = classify_file(
            entry.path(),
            &rel_path,
            size,
            include,
            exclude,
            limits,
            decode_policy,
            sampling_enabled,
        )?;
        let Some(classified) = classified else {
            continue;
        };

        // mtime/size changed but the file's content (post-redaction) may not
        // have: a touch, a checkout that resets mtimes, or an editor
        // save-without-edit all land here. Compare the content hash before
        // paying for a full parse.
        if let Some(prev) = existing.get(&key) {
            if prev.deleted_ts == 0 && prev.hash.is_some() {
                let candidate_hash = classified.content.as_deref().map(|c| sha1_hex(&redact(c)));
                if candidate_hash.is_some() && candidate_hash == prev.hash {
                    outcome.tasks.push(DbTask::new(TaskKind::UpdateLastSeen {
                        db_paths: vec![key],
                        ts: now_ts(),
                    }));
                    continue;
                }
            }
        }

        outcome.files_changed += 1;
        let (record, symbols, relations, engine_docs) =
            build_row(&key, root_id, &rel_path, repo, mtime, size, classified, registry);

        if cold_start {
            bulk_rows.push(record);
            bulk_docs.extend(engine_docs);
        } else {
            outcome.tasks.push(DbTask::new(TaskKind::UpsertFiles {
                rows: vec![record],
                engine_docs,
            }));
        }
        if !symbols.is_empty() {
            outcome.tasks.push(DbTask::new(TaskKind::UpsertSymbols { rows: symbols }));
        }
        if !relations.is_empty() {
            outcome
                .tasks
                .push(DbTask::new(TaskKind::UpsertRelations { rows: relations }));
        }
    }

    if cold_start && !bulk_rows.is_empty() {
        outcome.tasks.push(DbTask::new(TaskKind::BulkUpsertFiles {
            rows: bulk_rows,
            engine_docs: bulk_docs,
        }));
    }

    for (db_path_str, meta) in &existing {
        if meta.deleted_ts == 0 && !seen_paths.contains_key(db_path_str) {
            outcome.files_deleted += 1;
            outcome.tasks.push(DbTask::new(TaskKind::DeletePath {
                db_path: db_path_str.clone(),
                engine_delete: true,
            }));
        }
    }

    Ok(outcome)
}

/// Classifies and parses a single known file, as opposed to a full-tree
/// walk: used when a watch event names one changed path rather than during
/// a startup/rescan sweep.
#[allow(clippy::too_many_arguments)]
pub fn index_file(
    path: &Path,
    db_path_str: &str,
    root_id: &str,
    rel_path: &str,
    repo: &str,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
    limits: SizeLimits,
    decode_policy: Utf8DecodePolicy,
    sampling_enabled: bool,
    registry: &ParserRegistry,
) -> std::io::Result<Option<Vec<DbTask>>> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(None),
    };
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let classified = classify_file(
        path,
        rel_path,
        size,
        include,
        exclude,
        limits,
        decode_policy,
        sampling_enabled,
    )?;
    let Some(classified) = classified else {
        return Ok(None);
    };

    let (record, symbols, relations, engine_docs) =
        build_row(db_path_str, root_id, rel_path, repo, mtime, size, classified, registry);

    let mut tasks = vec![DbTask::new(TaskKind::UpsertFiles {
        rows: vec![record],
        engine_docs,
    })];
    if !symbols.is_empty() {
        tasks.push(DbTask::new(TaskKind::UpsertSymbols { rows: symbols }));
    }
    if !relations.is_empty() {
        tasks.push(DbTask::new(TaskKind::UpsertRelations { rows: relations }));
    }
    Ok(Some(tasks))
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    db_path_str: &str,
    root_id: &str,
    rel_path: &str,
    repo: &str,
    mtime: i64,
    size: u64,
    classified: ClassifyResult,
    registry: &ParserRegistry,
) -> (
    FileRecord,
    Vec<sari_model::Symbol>,
    Vec<sari_model::Relation>,
    Vec<EngineDoc>,
) {
    let ext = rel_path.rsplit('.').next().unwrap_or("");
    let redacted = classified.content.as_deref().map(redact);

    let (symbols, relations) = match (&redacted, classified.parse_status) {
        (Some(content), sari_model::ParseStatus::Ok) => {
            registry.parse(db_path_str, root_id, ext, content)
        }
        _ => (Vec::new(), Vec::new()),
    };

    let hash = redacted.as_deref().map(sha1_hex);
    let fts_content = redacted.clone();

    let record = FileRecord {
        db_path: db_path_str.to_string(),
        rel_path: rel_path.to_string(),
        root_id: root_id.to_string(),
        repo: Some(repo.to_string()),
        mtime,
        size,
        content: redacted.as_ref().map(|c| c.clone().into_bytes()),
        hash,
        fts_content,
        last_seen_ts: now_ts(),
        deleted_ts: 0,
        parse_status: classified.parse_status,
        parse_reason: classified.parse_reason,
        ast_status: classified.ast_status,
        ast_reason: classified.ast_reason,
        is_binary: classified.is_binary,
        is_minified: classified.is_minified,
        sampled: classified.sampled,
        metadata: serde_json::json!({}),
    };

    let engine_docs = match &redacted {
        Some(content) if classified.parse_status == sari_model::ParseStatus::Ok => vec![EngineDoc {
            db_path: db_path_str.to_string(),
            rel_path: rel_path.to_string(),
            root_id: root_id.to_string(),
            repo: repo.to_string(),
            fts_content: content.clone(),
            mtime,
            size: size as i64,
        }],
        _ => Vec::new(),
    };

    (record, symbols, relations, engine_docs)
}

fn sha1_hex(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::size_limits_for;
    use sari_model::config::SizeProfile;
    use sari_storage::schema;
    use std::fs;
    use tempfile::TempDir;

    fn limits() -> SizeLimits {
        size_limits_for(SizeProfile::Default, 2 * 1024 * 1024, 1024 * 1024)
    }

    #[test]
    fn scan_produces_upsert_for_new_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "def handle(): pass").unwrap();
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let registry = ParserRegistry::default();

        let outcome = scan_once(
            &conn,
            &registry,
            "r1",
            dir.path(),
            "demo",
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap();

        assert_eq!(outcome.files_seen, 1);
        assert_eq!(outcome.files_changed, 1);
        assert!(outcome
            .tasks
            .iter()
            .any(|t| matches!(t.kind, TaskKind::BulkUpsertFiles { .. })));
    }

    #[test]
    fn warm_scan_produces_plain_upsert_not_bulk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "def handle(): pass").unwrap();
        fs::write(dir.path().join("b.py"), "def other(): pass").unwrap();
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let registry = ParserRegistry::default();

        // Seed one existing row so the root is no longer a cold start.
        conn.execute(
            "INSERT INTO files (path, rel_path, root_id, repo, mtime, size, deleted_ts, parse_status, parse_reason, ast_status, ast_reason, is_binary, is_minified, last_seen_ts, metadata_json) \
             VALUES ('r1/b.py', 'b.py', 'r1', 'demo', 1, 1, 0, 'ok', 'none', 'ok', 'none', 0, 0, 0, '{}')",
            [],
        )
        .unwrap();

        let outcome = scan_once(
            &conn,
            &registry,
            "r1",
            dir.path(),
            "demo",
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap();

        assert!(outcome
            .tasks
            .iter()
            .any(|t| matches!(t.kind, TaskKind::UpsertFiles { .. })));
        assert!(!outcome
            .tasks
            .iter()
            .any(|t| matches!(t.kind, TaskKind::BulkUpsertFiles { .. })));
    }

    #[test]
    fn unchanged_file_only_updates_last_seen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "def handle(): pass").unwrap();
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let registry = ParserRegistry::default();

        let metadata = fs::metadata(&path).unwrap();
        let mtime = metadata
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        conn.execute(
            "INSERT INTO files (path, rel_path, root_id, repo, mtime, size, deleted_ts, parse_status, parse_reason, ast_status, ast_reason, is_binary, is_minified, last_seen_ts, metadata_json) \
             VALUES ('r1/a.py', 'a.py', 'r1', 'demo', ?1, ?2, 0, 'ok', 'none', 'ok', 'none', 0, 0, 0, '{}')",
            rusqlite::params![mtime, metadata.len() as i64],
        )
        .unwrap();

        let outcome = scan_once(
            &conn,
            &registry,
            "r1",
            dir.path(),
            "demo",
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap();

        assert_eq!(outcome.files_changed, 0);
        assert!(outcome
            .tasks
            .iter()
            .all(|t| matches!(t.kind, TaskKind::UpdateLastSeen { .. })));
    }

    #[test]
    fn vanished_file_produces_delete_task() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let registry = ParserRegistry::default();
        conn.execute(
            "INSERT INTO files (path, rel_path, root_id, repo, mtime, size, deleted_ts, parse_status, parse_reason, ast_status, ast_reason, is_binary, is_minified, last_seen_ts, metadata_json) \
             VALUES ('r1/gone.py', 'gone.py', 'r1', 'demo', 0, 0, 0, 'ok', 'none', 'ok', 'none', 0, 0, 0, '{}')",
            [],
        )
        .unwrap();

        let outcome = scan_once(
            &conn,
            &registry,
            "r1",
            dir.path(),
            "demo",
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap();

        assert_eq!(outcome.files_deleted, 1);
        assert!(outcome
            .tasks
            .iter()
            .any(|t| matches!(&t.kind, TaskKind::DeletePath { db_path, .. } if db_path == "r1/gone.py")));
    }
}
