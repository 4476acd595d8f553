//! Shared data model for the Sari code intelligence core.
//!
//! This crate defines the core entities (Root, File, Symbol, Relation,
//! FailedTask, CoalesceTask, FsEvent, DaemonRegistryEntry, WorkspaceBinding,
//! Deployment), the db-path / root_id conventions, and the process-wide
//! configuration surface. It has no dependency on any other workspace
//! crate.

pub mod config;
pub mod entities;
pub mod error;
pub mod path;

pub use entities::*;
pub use error::{ModelError, Result};
pub use path::{db_path, root_id_for, DbPath, PathResolver};
