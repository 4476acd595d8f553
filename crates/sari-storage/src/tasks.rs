//! Task kinds accepted by the DB writer queue, and the secondary-index sink
//! trait engine upserts/deletes are issued through after a commit.

use sari_model::{FailedTask, FileRecord, Relation, Symbol};
use serde_json::Value as Json;

/// A document handed to the search engine after a successful DB commit.
#[derive(Debug, Clone)]
pub struct EngineDoc {
    pub db_path: String,
    pub rel_path: String,
    pub root_id: String,
    pub repo: String,
    pub fts_content: String,
    pub mtime: i64,
    pub size: i64,
}

/// The secondary full-text index. Engine failures never roll back a DB
/// transaction: the engine is rebuildable from `files`.
pub trait EngineSink: Send + Sync {
    fn upsert_documents(&self, docs: &[EngineDoc]) -> Result<(), String>;
    fn delete_documents(&self, db_paths: &[String]) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct RepoMeta {
    pub root_id: String,
    pub key: String,
    pub value: Json,
}

#[derive(Debug, Clone)]
pub struct Snippet {
    pub tag: String,
    pub root_id: String,
    pub path: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub content: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub topic: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// One unit of work accepted by the writer, tagged with its arrival time for
/// the latency window and its current retry count.
#[derive(Debug, Clone)]
pub struct DbTask {
    pub kind: TaskKind,
    pub attempts: u32,
    pub enqueue_ts: i64,
}

impl DbTask {
    pub fn new(kind: TaskKind) -> Self {
        DbTask {
            kind,
            attempts: 0,
            enqueue_ts: now_ts(),
        }
    }
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    DeletePath {
        db_path: String,
        engine_delete: bool,
    },
    UpsertFiles {
        rows: Vec<FileRecord>,
        engine_docs: Vec<EngineDoc>,
    },
    /// Bulk variant of `UpsertFiles`: folds rows through the staging table
    /// in one transaction instead of one `ON CONFLICT` upsert per row. Used
    /// for a cold-start scan of a root with no existing `files` rows.
    BulkUpsertFiles {
        rows: Vec<FileRecord>,
        engine_docs: Vec<EngineDoc>,
    },
    UpsertSymbols {
        rows: Vec<Symbol>,
    },
    UpsertRelations {
        rows: Vec<Relation>,
    },
    UpdateLastSeen {
        db_paths: Vec<String>,
        ts: i64,
    },
    UpsertRepoMeta {
        rows: Vec<RepoMeta>,
    },
    UpsertSnippets {
        rows: Vec<Snippet>,
    },
    UpsertContexts {
        rows: Vec<Context>,
    },
    DlqUpsert {
        rows: Vec<FailedTask>,
    },
    DlqClear {
        db_paths: Vec<String>,
    },
}

impl TaskKind {
    /// Canonical phase ordinal within a batch. Lower runs first.
    pub fn phase(&self) -> u8 {
        match self {
            TaskKind::DeletePath { .. } => 0,
            TaskKind::UpsertFiles { .. } => 1,
            TaskKind::BulkUpsertFiles { .. } => 1,
            TaskKind::UpsertSymbols { .. } => 2,
            TaskKind::UpsertRelations { .. } => 3,
            TaskKind::UpdateLastSeen { .. } => 4,
            TaskKind::UpsertRepoMeta { .. } => 5,
            TaskKind::UpsertSnippets { .. } => 6,
            TaskKind::UpsertContexts { .. } => 7,
            TaskKind::DlqUpsert { .. } => 8,
            TaskKind::DlqClear { .. } => 9,
        }
    }
}
