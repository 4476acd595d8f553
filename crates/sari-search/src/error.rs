//! Error types for sari-search.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("sqlite search backend failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedded index failed: {0}")]
    Engine(String),

    #[error("invalid search query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;
