//! Error types for sari-watch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("root path does not exist: {0}")]
    RootNotFound(String),

    #[error("root path is not a directory: {0}")]
    RootNotDirectory(String),

    #[error("failed to create watcher: {0}")]
    WatcherInit(String),

    #[error("failed to watch path {path}: {source}")]
    WatchFailed {
        path: String,
        #[source]
        source: notify::Error,
    },
}

pub type Result<T> = std::result::Result<T, WatchError>;
