pub mod error;
pub mod glob;
pub mod normalize;
pub mod router;
pub mod sqlite_mode;
pub mod tantivy_mode;
pub mod types;

pub use error::{Result, SearchError};
pub use router::{EngineRouter, EnginePreference};
pub use tantivy_mode::{EmbeddedDoc, EmbeddedIndex};
pub use types::{
    EngineMode, EngineReason, EngineStatus, RepoCandidate, SearchHit, SearchOptions, SearchResult,
    TotalMode,
};
