//! Indexer worker crate: per-file classification, secret redaction,
//! directory scanning, DLQ retry, priority-aged scheduling, and the worker
//! that ties them together with the watcher and the DB writer.

pub mod classify;
pub mod dlq;
pub mod error;
pub mod redact;
pub mod scanner;
pub mod scheduler;
pub mod worker;

pub use classify::{classify_file, size_limits_for, ClassifyResult, SizeLimits};
pub use error::{IndexError, Result};
pub use redact::redact;
pub use scanner::{scan_once, ScanOutcome};
pub use scheduler::{AgingPriorityQueue, SchedulingCoordinator, WeightedFairQueue};
pub use worker::{IndexerWorker, WorkerConfig};
