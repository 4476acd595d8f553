//! Core entities shared across the indexing, storage, search, and registry
//! crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A registered workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub root_id: String,
    pub canonical_path: String,
    pub label: Option<String>,
    pub file_count: u64,
    pub symbol_count: u64,
    pub created_ts: i64,
    pub updated_ts: i64,
}

/// Outcome of the per-file classification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Ok,
    Skipped,
}

/// Reason code attached to a skipped/errored parse or ast status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    None,
    Binary,
    Minified,
    TooLarge,
    Sampled,
    NoParse,
    Excluded,
    Timeout,
    Error,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::None => "none",
            Reason::Binary => "binary",
            Reason::Minified => "minified",
            Reason::TooLarge => "too_large",
            Reason::Sampled => "sampled",
            Reason::NoParse => "no_parse",
            Reason::Excluded => "excluded",
            Reason::Timeout => "timeout",
            Reason::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AstStatus {
    Ok,
    Skipped,
    Timeout,
    None,
}

/// A file row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub db_path: String,
    pub rel_path: String,
    pub root_id: String,
    pub repo: Option<String>,
    pub mtime: i64,
    pub size: u64,
    pub content: Option<Vec<u8>>,
    pub hash: Option<String>,
    pub fts_content: Option<String>,
    pub last_seen_ts: i64,
    pub deleted_ts: i64,
    pub parse_status: ParseStatus,
    pub parse_reason: Reason,
    pub ast_status: AstStatus,
    pub ast_reason: Reason,
    pub is_binary: bool,
    pub is_minified: bool,
    pub sampled: bool,
    pub metadata: serde_json::Value,
}

impl FileRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_ts != 0
    }
}

/// Symbol kind, normalized across languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Module,
    Variable,
    Field,
    Interface,
    Enum,
    Constant,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Module => "module",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Constant => "constant",
        }
    }
}

/// A symbol row. `symbol_id` is deterministic:
/// `sha1(db_path|kind|qualname)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol_id: String,
    pub db_path: String,
    pub root_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub end_line: u32,
    pub content: Option<String>,
    pub parent: Option<String>,
    pub qualname: String,
    pub meta: serde_json::Value,
    pub doc: Option<String>,
    pub importance_score: f64,
}

pub fn compute_symbol_id(db_path: &str, kind: SymbolKind, qualname: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(db_path.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(qualname.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelType {
    Calls,
    Extends,
    Implements,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::Calls => "calls",
            RelType::Extends => "extends",
            RelType::Implements => "implements",
        }
    }
}

/// A call/inheritance relation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub from_path: String,
    pub from_root_id: String,
    pub from_symbol: String,
    pub from_symbol_id: Option<String>,
    pub to_path: String,
    pub to_root_id: String,
    pub to_symbol: String,
    pub to_symbol_id: Option<String>,
    pub rel_type: RelType,
    pub line: Option<u32>,
    pub meta: serde_json::Value,
}

/// A recoverable-but-currently-failing task, tracked in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTask {
    pub db_path: String,
    pub attempts: u32,
    pub last_error: String,
    pub ts: i64,
    pub next_retry_ts: i64,
}

/// In-memory coalesce task action. DELETE absorbs INDEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoalesceAction {
    Index,
    Delete,
}

impl CoalesceAction {
    /// Merge a new action onto an existing one. DELETE is absorbing.
    pub fn merge(self, new: CoalesceAction) -> CoalesceAction {
        match (self, new) {
            (CoalesceAction::Delete, _) | (_, CoalesceAction::Delete) => CoalesceAction::Delete,
            _ => CoalesceAction::Index,
        }
    }
}

/// An in-memory coalesced task.
#[derive(Debug, Clone)]
pub struct CoalesceTask {
    pub action: CoalesceAction,
    pub db_path: String,
    pub attempts: u32,
    pub enqueue_ts: i64,
    pub last_seen_ts: i64,
}

/// Raw filesystem event kind, pre-coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    pub dest_path: Option<PathBuf>,
    pub ts: i64,
}

/// Live daemon process identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRegistryEntry {
    pub boot_id: String,
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub version: String,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub last_seen_ts: i64,
    pub draining: bool,
}

/// Which daemon owns a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBinding {
    pub canonical_root: String,
    pub boot_id: String,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
}

/// Upgrade/drain state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Idle,
    Starting,
    Ready,
    Switched,
}

/// A deployment generation's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub generation: u64,
    pub active_boot_id: Option<String>,
    pub candidate_boot_id: Option<String>,
    pub state: DeploymentState,
    pub health_fail_streak: u32,
    pub rollback_reason: Option<String>,
}

impl Default for Deployment {
    fn default() -> Self {
        Deployment {
            generation: 0,
            active_boot_id: None,
            candidate_boot_id: None,
            state: DeploymentState::Idle,
            health_fail_streak: 0,
            rollback_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_is_deterministic() {
        let a = compute_symbol_id("r1/a.py", SymbolKind::Function, "Foo.bar");
        let b = compute_symbol_id("r1/a.py", SymbolKind::Function, "Foo.bar");
        assert_eq!(a, b);
        let c = compute_symbol_id("r1/a.py", SymbolKind::Method, "Foo.bar");
        assert_ne!(a, c);
    }

    #[test]
    fn delete_absorbs_index() {
        assert_eq!(
            CoalesceAction::Index.merge(CoalesceAction::Delete),
            CoalesceAction::Delete
        );
        assert_eq!(
            CoalesceAction::Delete.merge(CoalesceAction::Index),
            CoalesceAction::Delete
        );
        assert_eq!(
            CoalesceAction::Index.merge(CoalesceAction::Index),
            CoalesceAction::Index
        );
    }
}
