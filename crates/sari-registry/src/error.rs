//! Error types for sari-registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error on registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file {path} has invalid json: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not acquire exclusive lock on {0}")]
    LockFailed(String),

    #[error("illegal deployment transition: {from} -> {attempted}")]
    InvalidTransition { from: &'static str, attempted: &'static str },

    #[error("daemon lock held by another leader: {0}")]
    LeaderLockHeld(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
