//! SQLite-backed persistence for the Sari code intelligence core.
//!
//! Owns the schema/migrations (§4.6), the single-writer batched DB writer
//! (§4.5), and the cross-process write gate that keeps that invariant true
//! even across separate daemon processes sharing one database file.

pub mod error;
pub mod gate;
pub mod queries;
pub mod schema;
pub mod store;
pub mod tasks;
pub mod writer;

pub use error::{Result, StorageError};
pub use gate::WriteGate;
pub use schema::{init_schema, CURRENT_SCHEMA_VERSION};
pub use tasks::{Context, DbTask, EngineDoc, EngineSink, RepoMeta, Snippet, TaskKind};
pub use writer::{DbWriter, WriterConfig, WriterMetrics};
