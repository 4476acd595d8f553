//! Error types for sari-index.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] sari_storage::StorageError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("watch error: {0}")]
    Watch(#[from] sari_watch::WatchError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan lock already held for {0}")]
    LockHeld(String),

    #[error("parse timed out for {0}")]
    ParseTimeout(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
