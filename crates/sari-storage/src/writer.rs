//! Single-writer batched DB writer: one background thread owns the write
//! connection, draining tasks off an mpsc channel into batches and applying
//! each batch inside one transaction, in canonical phase order. Failed
//! batches are split and requeued up to a configured retry count. Engine
//! upserts/deletes are buffered and issued only after the DB transaction
//! commits, never interleaved with it.

use crate::error::{Result, StorageError};
use crate::queries;
use crate::tasks::{DbTask, EngineDoc, EngineSink, TaskKind};
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct WriterConfig {
    pub max_batch: usize,
    pub max_wait: Duration,
    pub max_retries: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            max_batch: 100,
            max_wait: Duration::from_millis(150),
            max_retries: 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriterMetrics {
    pub committed_batches: u64,
    pub committed_tasks: u64,
    pub dropped_critical: u64,
    pub requeued: u64,
}

struct Shared {
    metrics: Mutex<WriterMetrics>,
    latency_window: Mutex<VecDeque<Duration>>,
    in_flight: Mutex<usize>,
}

/// Handle to the running writer thread. Dropping it signals shutdown and
/// joins, flushing whatever is already queued.
pub struct DbWriter {
    sender: Sender<DbTask>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl DbWriter {
    pub fn spawn(
        conn: Arc<Mutex<Connection>>,
        engine: Option<Arc<dyn EngineSink>>,
        config: WriterConfig,
    ) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel();
        let shared = Arc::new(Shared {
            metrics: Mutex::new(WriterMetrics::default()),
            latency_window: Mutex::new(VecDeque::with_capacity(100)),
            in_flight: Mutex::new(0),
        });
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        {
            let guard = conn.lock().unwrap();
            if let Err(e) = crate::store::attach_staging(&guard) {
                tracing::warn!(error = %e, "failed to attach staging db; bulk upserts will error");
            }
        }

        let thread_shared = shared.clone();
        let thread_stop = stop.clone();
        let requeue_sender = sender.clone();
        let handle = std::thread::Builder::new()
            .name("sari-db-writer".into())
            .spawn(move || {
                run(
                    conn,
                    engine,
                    config,
                    receiver,
                    requeue_sender,
                    thread_shared,
                    thread_stop,
                )
            })
            .expect("spawn db writer thread");

        DbWriter {
            sender,
            shared,
            handle: Some(handle),
            stop,
        }
    }

    pub fn enqueue(&self, task: DbTask) {
        let _ = self.sender.send(task);
    }

    pub fn metrics(&self) -> WriterMetrics {
        *self.shared.metrics.lock().unwrap()
    }

    /// Block until the queue drains and no batch is in flight, or `timeout`
    /// elapses.
    pub fn flush(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            let in_flight = *self.shared.in_flight.lock().unwrap();
            if in_flight == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for DbWriter {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    conn: Arc<Mutex<Connection>>,
    engine: Option<Arc<dyn EngineSink>>,
    config: WriterConfig,
    receiver: Receiver<DbTask>,
    requeue_sender: Sender<DbTask>,
    shared: Arc<Shared>,
    stop: Arc<std::sync::atomic::AtomicBool>,
) {
    loop {
        let batch = drain_batch(&receiver, config.max_batch, config.max_wait);
        if batch.is_empty() {
            if stop.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            continue;
        }

        *shared.in_flight.lock().unwrap() += batch.len();
        let now = now_ts();
        {
            let mut window = shared.latency_window.lock().unwrap();
            for task in &batch {
                if window.len() == 100 {
                    window.pop_front();
                }
                window.push_back(Duration::from_secs((now - task.enqueue_ts).max(0) as u64));
            }
        }

        match process_batch(&conn, engine.as_deref(), &batch) {
            Ok(()) => {
                let mut metrics = shared.metrics.lock().unwrap();
                metrics.committed_batches += 1;
                metrics.committed_tasks += batch.len() as u64;
            }
            Err(err) => {
                tracing::warn!(error = %err, batch_len = batch.len(), "db writer batch failed");
                requeue_failed(batch.clone(), config.max_retries, &requeue_sender, &shared, err);
            }
        }
        *shared.in_flight.lock().unwrap() -= batch.len();

        if batch.is_empty() && stop.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
    }
}

fn drain_batch(receiver: &Receiver<DbTask>, limit: usize, max_wait: Duration) -> Vec<DbTask> {
    let mut tasks = Vec::new();
    match receiver.recv_timeout(max_wait) {
        Ok(task) => tasks.push(task),
        Err(RecvTimeoutError::Timeout) => return tasks,
        Err(RecvTimeoutError::Disconnected) => return tasks,
    }
    while tasks.len() < limit {
        match receiver.try_recv() {
            Ok(task) => tasks.push(task),
            Err(_) => break,
        }
    }
    tasks
}

fn requeue_failed(
    batch: Vec<DbTask>,
    max_retries: u32,
    sender: &Sender<DbTask>,
    shared: &Arc<Shared>,
    err: StorageError,
) {
    let mut retried = 0u64;
    let mut dropped = 0u64;
    for mut task in batch {
        if task.attempts < max_retries {
            task.attempts += 1;
            if sender.send(task).is_ok() {
                retried += 1;
            } else {
                dropped += 1;
            }
        } else {
            dropped += 1;
        }
    }
    let mut metrics = shared.metrics.lock().unwrap();
    metrics.requeued += retried;
    metrics.dropped_critical += dropped;
    if dropped > 0 {
        tracing::error!(dropped, %err, "db writer dropped tasks past max_retries");
    }
}

/// Execute one batch inside a single transaction, in the canonical phase
/// order, then apply engine effects after a successful commit.
fn process_batch(
    conn: &Arc<Mutex<Connection>>,
    engine: Option<&dyn EngineSink>,
    batch: &[DbTask],
) -> Result<()> {
    let mut ordered: Vec<&DbTask> = batch.iter().collect();
    ordered.sort_by_key(|t| t.kind.phase());

    let deleted: HashSet<String> = ordered
        .iter()
        .filter_map(|t| match &t.kind {
            TaskKind::DeletePath { db_path, .. } => Some(db_path.clone()),
            _ => None,
        })
        .collect();

    let mut pending_upserts: Vec<EngineDoc> = Vec::new();
    let mut pending_deletes: Vec<String> = Vec::new();

    {
        let mut guard = conn.lock().map_err(|_| StorageError::transaction("writer mutex poisoned"))?;
        let tx = guard
            .transaction()
            .map_err(|e| StorageError::transaction(format!("BEGIN failed: {e}")))?;

        for task in &ordered {
            match &task.kind {
                TaskKind::DeletePath { db_path, engine_delete } => {
                    queries::delete_path(&tx, db_path)?;
                    if *engine_delete {
                        pending_deletes.push(db_path.clone());
                    }
                }
                TaskKind::UpsertFiles { rows, engine_docs } => {
                    let filtered = queries::filter_deleted(rows, &deleted);
                    queries::upsert_files(&tx, &filtered)?;
                    let filtered_paths: HashSet<&str> =
                        filtered.iter().map(|r| r.db_path.as_str()).collect();
                    pending_upserts.extend(
                        engine_docs
                            .iter()
                            .filter(|d| filtered_paths.contains(d.db_path.as_str()))
                            .cloned(),
                    );
                }
                TaskKind::BulkUpsertFiles { rows, engine_docs } => {
                    let filtered = queries::filter_deleted(rows, &deleted);
                    queries::insert_staging_files(&tx, &filtered)?;
                    queries::fold_staging_into_files(&tx)?;
                    let filtered_paths: HashSet<&str> =
                        filtered.iter().map(|r| r.db_path.as_str()).collect();
                    pending_upserts.extend(
                        engine_docs
                            .iter()
                            .filter(|d| filtered_paths.contains(d.db_path.as_str()))
                            .cloned(),
                    );
                }
                TaskKind::UpsertSymbols { rows } => queries::upsert_symbols(&tx, rows)?,
                TaskKind::UpsertRelations { rows } => queries::upsert_relations(&tx, rows)?,
                TaskKind::UpdateLastSeen { db_paths, ts } => {
                    queries::update_last_seen(&tx, db_paths, *ts)?
                }
                TaskKind::UpsertRepoMeta { rows } => queries::upsert_repo_meta(&tx, rows)?,
                TaskKind::UpsertSnippets { rows } => queries::upsert_snippets(&tx, rows)?,
                TaskKind::UpsertContexts { rows } => queries::upsert_contexts(&tx, rows)?,
                TaskKind::DlqUpsert { rows } => queries::dlq_upsert(&tx, rows)?,
                TaskKind::DlqClear { db_paths } => queries::dlq_clear(&tx, db_paths)?,
            }
        }

        tx.commit()
            .map_err(|e| StorageError::transaction(format!("COMMIT failed: {e}")))?;
    }

    if let Some(engine) = engine {
        if !pending_upserts.is_empty() {
            if let Err(e) = engine.upsert_documents(&pending_upserts) {
                tracing::warn!(error = %e, "engine upsert failed after commit; engine is rebuildable");
            }
        }
        if !pending_deletes.is_empty() {
            if let Err(e) = engine.delete_documents(&pending_deletes) {
                tracing::warn!(error = %e, "engine delete failed after commit; engine is rebuildable");
            }
        }
    }

    Ok(())
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use sari_model::{AstStatus, FileRecord, ParseStatus, Reason};

    fn make_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn file_row(db_path: &str) -> FileRecord {
        FileRecord {
            db_path: db_path.into(),
            rel_path: db_path.split_once('/').map(|(_, r)| r.to_string()).unwrap_or_default(),
            root_id: db_path.split('/').next().unwrap_or("").into(),
            repo: None,
            mtime: 0,
            size: 0,
            content: None,
            hash: None,
            fts_content: None,
            last_seen_ts: 0,
            deleted_ts: 0,
            parse_status: ParseStatus::Ok,
            parse_reason: Reason::None,
            ast_status: AstStatus::None,
            ast_reason: Reason::None,
            is_binary: false,
            is_minified: false,
            sampled: false,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn commit_then_ready_for_read() {
        let conn = make_conn();
        let writer = DbWriter::spawn(conn.clone(), None, WriterConfig::default());
        writer.enqueue(DbTask::new(TaskKind::UpsertFiles {
            rows: vec![file_row("r1/a.py")],
            engine_docs: vec![],
        }));
        assert!(writer.flush(Duration::from_secs(2)));

        let guard = conn.lock().unwrap();
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM files WHERE path = ?1", ["r1/a.py"], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_runs_before_upsert_in_same_batch() {
        let conn = make_conn();
        let batch = vec![
            DbTask::new(TaskKind::UpsertFiles {
                rows: vec![file_row("r1/a.py")],
                engine_docs: vec![],
            }),
            DbTask::new(TaskKind::DeletePath {
                db_path: "r1/a.py".into(),
                engine_delete: false,
            }),
        ];
        // Arrival order has upsert before delete; canonical phase order
        // must still run delete first and drop the same-path upsert.
        process_batch(&conn, None, &batch).unwrap();

        let guard = conn.lock().unwrap();
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM files WHERE path = ?1", ["r1/a.py"], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
