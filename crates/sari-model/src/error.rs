//! Error types for sari-model

use thiserror::Error;

/// Model-layer error kinds: path resolution and config validation failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("path '{path}' is not inside any registered root")]
    PathNotInAnyRoot { path: String },

    #[error("unknown root_id '{root_id}'")]
    UnknownRoot { root_id: String },

    #[error("invalid config value for '{field}': {value} ({hint})")]
    InvalidConfig {
        field: String,
        value: String,
        hint: String,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
