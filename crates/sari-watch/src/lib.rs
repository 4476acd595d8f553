//! Filesystem watching and event coalescing for the Sari indexer.
//!
//! `watcher` translates raw OS notifications into typed [`sari_model::FsEvent`]s
//! with debouncing and git-event classification (§4.1). `coalesce` turns
//! those into an at-most-one pending task per db-path (§4.2).

pub mod coalesce;
pub mod error;
pub mod watcher;

pub use coalesce::{dispatch_fs_event, default_queue, CoalesceMetrics, CoalesceQueue, SharedCoalesceQueue};
pub use error::{Result, WatchError};
pub use watcher::{FsWatcher, WatchConfig, WatchSink};
