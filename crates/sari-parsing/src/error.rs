//! Error types for sari-parsing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tree-sitter grammar rejected for {path}: {reason}")]
    GrammarSetup { path: String, reason: String },

    #[error("no handler registered for extension '{ext}'")]
    NoHandler { ext: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;
