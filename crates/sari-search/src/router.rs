//! Engine routing and selection policy: one engine instance per root,
//! upsert/delete dispatch by `doc_id` prefix, score-ordered result merging,
//! and the embedded-vs-sqlite selection/downgrade policy.
//!
//! `EngineRouter` implements `sari_storage::EngineSink` so the DB writer can
//! hold it as its post-commit engine target without `sari-storage` knowing
//! anything about tantivy.

use crate::error::Result;
use crate::tantivy_mode::{EmbeddedDoc, EmbeddedIndex};
use crate::types::{EngineMode, EngineReason, EngineStatus, SearchOptions, SearchResult, TotalMode};
use rusqlite::Connection;
use sari_storage::{EngineDoc, EngineSink};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Explicit engine preference. An explicit choice always wins over the
/// auto-selection heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePreference {
    Auto,
    Embedded,
    Sqlite,
}

struct RootEngine {
    index: EmbeddedIndex,
}

pub struct EngineRouter {
    base_dir: PathBuf,
    preference: EnginePreference,
    roots: RwLock<HashMap<String, RootEngine>>,
    status: RwLock<EngineStatus>,
}

impl EngineRouter {
    pub fn new(base_dir: PathBuf, preference: EnginePreference) -> Self {
        let initial_status = match preference {
            EnginePreference::Sqlite => EngineStatus {
                mode: EngineMode::Sqlite,
                ready: true,
                reason: EngineReason::Ok,
                hint: "sqlite mode selected explicitly".to_string(),
            },
            _ => EngineStatus {
                mode: EngineMode::Embedded,
                ready: true,
                reason: EngineReason::Ok,
                hint: String::new(),
            },
        };
        EngineRouter {
            base_dir,
            preference,
            roots: RwLock::new(HashMap::new()),
            status: RwLock::new(initial_status),
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status.read().expect("status lock poisoned").clone()
    }

    fn set_status(&self, status: EngineStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    fn root_dir(&self, root_id: &str) -> PathBuf {
        self.base_dir.join(root_id)
    }

    fn engine_for(&self, root_id: &str) -> Result<()> {
        {
            let roots = self.roots.read().expect("roots lock poisoned");
            if roots.contains_key(root_id) {
                return Ok(());
            }
        }
        match EmbeddedIndex::open_or_create(&self.root_dir(root_id)) {
            Ok(index) => {
                self.roots
                    .write()
                    .expect("roots lock poisoned")
                    .insert(root_id.to_string(), RootEngine { index });
                Ok(())
            }
            Err(err) => {
                self.set_status(EngineStatus {
                    mode: EngineMode::Sqlite,
                    ready: false,
                    reason: EngineReason::IndexMissing,
                    hint: format!("embedded index init failed for {root_id}: {err}"),
                });
                Err(err)
            }
        }
    }

    /// Whether the router should route to the embedded backend, per the
    /// explicit-config-wins / else-embedded-if-available selection policy.
    pub fn use_embedded(&self) -> bool {
        !matches!(self.preference, EnginePreference::Sqlite)
    }

    /// Root id prefix of a `"<root_id>/<rel_path>"` doc_id.
    fn root_of(doc_id: &str) -> &str {
        doc_id.split('/').next().unwrap_or(doc_id)
    }

    pub fn search(&self, opts: &SearchOptions) -> Result<SearchResult> {
        let mut merged: Vec<crate::types::SearchHit> = Vec::new();
        let root_ids: Vec<String> = if opts.root_ids.is_empty() {
            self.roots.read().expect("roots lock poisoned").keys().cloned().collect()
        } else {
            opts.root_ids.clone()
        };

        for root_id in &root_ids {
            if self.engine_for(root_id).is_err() {
                continue;
            }
            let roots = self.roots.read().expect("roots lock poisoned");
            if let Some(engine) = roots.get(root_id) {
                let result = engine.index.search(opts)?;
                merged.extend(result.hits);
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(opts.limit.max(1));

        Ok(SearchResult {
            total: merged.len(),
            hits: merged,
            total_mode: TotalMode::Estimated,
        })
    }

    /// Rebuilds one root's engine from `files` rows in storage: the engine
    /// is never a source of truth, so a missing or corrupt index recovers by
    /// replaying every parsed, non-deleted row for the root.
    pub fn rebuild(&self, conn: &Connection, root_id: &str) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT path, rel_path, repo, fts_content, mtime, size FROM files \
             WHERE root_id = ?1 AND deleted_ts = 0 AND fts_content IS NOT NULL",
        )?;
        let docs: Vec<EngineDoc> = stmt
            .query_map([root_id], |row| {
                Ok(EngineDoc {
                    db_path: row.get(0)?,
                    rel_path: row.get(1)?,
                    root_id: root_id.to_string(),
                    repo: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    fts_content: row.get(3)?,
                    mtime: row.get(4)?,
                    size: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.engine_for(root_id)?;
        {
            let roots = self.roots.read().expect("roots lock poisoned");
            if let Some(engine) = roots.get(root_id) {
                engine.index.clear()?;
            }
        }

        self.upsert_documents(&docs)
            .map_err(crate::error::SearchError::Engine)?;
        Ok(())
    }
}

impl EngineSink for EngineRouter {
    fn upsert_documents(&self, docs: &[EngineDoc]) -> std::result::Result<(), String> {
        let mut by_root: HashMap<String, Vec<EmbeddedDoc>> = HashMap::new();
        for doc in docs {
            by_root
                .entry(doc.root_id.clone())
                .or_default()
                .push(EmbeddedDoc {
                    doc_id: doc.db_path.clone(),
                    path: doc.db_path.clone(),
                    repo: doc.repo.clone(),
                    root_id: doc.root_id.clone(),
                    rel_path: doc.rel_path.clone(),
                    body: doc.fts_content.clone(),
                    mtime: doc.mtime,
                    size: doc.size,
                });
        }
        for (root_id, entries) in by_root {
            self.engine_for(&root_id).map_err(|e| e.to_string())?;
            let roots = self.roots.read().expect("roots lock poisoned");
            if let Some(engine) = roots.get(&root_id) {
                engine.index.upsert_documents(&entries).map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    fn delete_documents(&self, db_paths: &[String]) -> std::result::Result<(), String> {
        let mut by_root: HashMap<&str, Vec<String>> = HashMap::new();
        for db_path in db_paths {
            by_root.entry(Self::root_of(db_path)).or_default().push(db_path.clone());
        }
        for (root_id, paths) in by_root {
            if self.engine_for(root_id).is_err() {
                continue;
            }
            let roots = self.roots.read().expect("roots lock poisoned");
            if let Some(engine) = roots.get(root_id) {
                engine.index.delete_documents(&paths).map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn routes_upsert_and_search_through_embedded_backend() {
        let dir = TempDir::new().unwrap();
        let router = EngineRouter::new(dir.path().to_path_buf(), EnginePreference::Embedded);
        let docs = vec![EngineDoc {
            db_path: "r1/a.py".to_string(),
            rel_path: "a.py".to_string(),
            root_id: "r1".to_string(),
            repo: "demo".to_string(),
            fts_content: "def handle_request(): pass".to_string(),
            mtime: 100,
            size: 20,
        }];
        router.upsert_documents(&docs).unwrap();

        let opts = SearchOptions::new("handle_request");
        let result = router.search(&opts).unwrap();
        assert_eq!(result.hits.len(), 1);
    }

    #[test]
    fn delete_removes_document_from_its_root_engine() {
        let dir = TempDir::new().unwrap();
        let router = EngineRouter::new(dir.path().to_path_buf(), EnginePreference::Embedded);
        let docs = vec![EngineDoc {
            db_path: "r1/a.py".to_string(),
            rel_path: "a.py".to_string(),
            root_id: "r1".to_string(),
            repo: "demo".to_string(),
            fts_content: "def handle_request(): pass".to_string(),
            mtime: 100,
            size: 20,
        }];
        router.upsert_documents(&docs).unwrap();
        router.delete_documents(&["r1/a.py".to_string()]).unwrap();

        let opts = SearchOptions::new("handle_request");
        let result = router.search(&opts).unwrap();
        assert!(result.hits.is_empty());
    }

    #[test]
    fn rebuild_replays_engine_from_files_table() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        sari_storage::schema::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO files (path, rel_path, root_id, repo, mtime, size, fts_content, \
             deleted_ts, parse_status, parse_reason, ast_status, ast_reason, is_binary, \
             is_minified, last_seen_ts, metadata_json) \
             VALUES ('r1/a.py', 'a.py', 'r1', 'demo', 100, 20, 'def handle_request(): pass', \
             0, 'ok', 'none', 'ok', 'none', 0, 0, 0, '{}')",
            [],
        )
        .unwrap();

        let router = EngineRouter::new(dir.path().to_path_buf(), EnginePreference::Embedded);
        router.rebuild(&conn, "r1").unwrap();

        let mut opts = SearchOptions::new("handle_request");
        opts.root_ids = vec!["r1".to_string()];
        let result = router.search(&opts).unwrap();
        assert_eq!(result.hits.len(), 1);
    }
}
