//! Shared search types: options accepted by both backends, the hit shape
//! returned to callers, and engine status/selection reporting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalMode {
    Exact,
    Estimated,
}

impl Default for TotalMode {
    fn default() -> Self {
        TotalMode::Exact
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub repo: Option<String>,
    pub root_ids: Vec<String>,
    pub file_types: Vec<String>,
    pub path_pattern: Option<String>,
    pub exclude_patterns: Vec<String>,
    pub total_mode: TotalMode,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        SearchOptions {
            query: query.into(),
            limit: 50,
            offset: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub repo: String,
    pub path: String,
    pub score: f64,
    pub snippet: String,
    pub mtime: i64,
    pub size: i64,
    pub match_count: u32,
    pub file_type: String,
    pub hit_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub total_mode: TotalMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Sqlite,
    Embedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineReason {
    NotInstalled,
    IndexMissing,
    ConfigMismatch,
    Ok,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub mode: EngineMode,
    pub ready: bool,
    pub reason: EngineReason,
    pub hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoCandidate {
    pub repo: String,
    pub score: i64,
}
