//! Indexer worker: drains the coalesce queue through the scheduling
//! coordinator, classifies and parses each path, and enqueues the resulting
//! rows onto the DB writer. Owns the startup scan, the watch-event pump,
//! and the DLQ poll loop.

use crate::classify::SizeLimits;
use crate::dlq;
use crate::error::{IndexError, Result};
use crate::scanner;
use crate::scheduler::SchedulingCoordinator;
use globset::GlobSet;
use rusqlite::Connection;
use sari_model::config::Utf8DecodePolicy;
use sari_model::{db_path, CoalesceAction, CoalesceTask, PathResolver};
use sari_parsing::ParserRegistry;
use sari_storage::{DbTask, DbWriter, TaskKind};
use sari_watch::{CoalesceQueue, FsWatcher, WatchConfig as FsWatchConfig, WatchSink};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct WorkerConfig {
    pub include: Option<GlobSet>,
    pub exclude: Option<GlobSet>,
    pub size_limits: SizeLimits,
    pub decode_policy: Utf8DecodePolicy,
    pub sampling_enabled: bool,
    pub parse_timeout: Duration,
    pub parse_timeout_workers: usize,
    pub dlq_poll_interval: Duration,
    pub scan_interval: Duration,
    pub startup_index: bool,
    pub coalesce_shards: usize,
    pub coalesce_max_keys: usize,
    pub watch_config: FsWatchConfig,
}

/// Wires the watcher, coalesce queue, parser registry, and DB writer
/// together for one or more registered workspace roots.
pub struct IndexerWorker {
    resolver: Arc<RwLock<PathResolver>>,
    repos: RwLock<std::collections::HashMap<String, String>>,
    registry: Arc<ParserRegistry>,
    read_conn: Arc<Mutex<Connection>>,
    writer: Arc<DbWriter>,
    queue: Arc<CoalesceQueue>,
    config: WorkerConfig,
    stop: Arc<AtomicBool>,
    rescan_requested: Arc<AtomicBool>,
    watcher: Mutex<Option<FsWatcher>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    coordinator: Arc<SchedulingCoordinator<CoalesceTask>>,
    parse_pool: rayon::ThreadPool,
}

struct Sink {
    queue: Arc<CoalesceQueue>,
    resolver_paths: Arc<RwLock<PathResolver>>,
}

impl WatchSink for Sink {
    fn on_event(&self, event: sari_model::FsEvent) {
        let resolver = self.resolver_paths.read().expect("resolver lock poisoned");
        sari_watch::dispatch_fs_event(&self.queue, &resolver, &event);
    }

    fn on_git_event(&self, _path: PathBuf) {}
}

impl IndexerWorker {
    pub fn new(
        read_conn: Arc<Mutex<Connection>>,
        writer: Arc<DbWriter>,
        registry: Arc<ParserRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let parse_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parse_timeout_workers.max(1))
            .thread_name(|i| format!("sari-parse-{i}"))
            .build()
            .expect("build parse timeout pool");
        IndexerWorker {
            resolver: Arc::new(RwLock::new(PathResolver::new())),
            repos: RwLock::new(std::collections::HashMap::new()),
            registry,
            read_conn,
            writer,
            queue: Arc::new(CoalesceQueue::new(config.coalesce_shards, config.coalesce_max_keys)),
            config,
            stop: Arc::new(AtomicBool::new(false)),
            rescan_requested: Arc::new(AtomicBool::new(false)),
            watcher: Mutex::new(None),
            threads: Mutex::new(Vec::new()),
            coordinator: Arc::new(SchedulingCoordinator::new()),
            parse_pool,
        }
    }

    /// Registers a workspace root for scanning and watching, returning its
    /// stable root_id.
    pub fn register_root(&self, canonical_path: &Path, repo: &str) -> String {
        let root_id = self
            .resolver
            .write()
            .expect("resolver lock poisoned")
            .register_root(canonical_path);
        self.repos
            .write()
            .expect("repos lock poisoned")
            .insert(root_id.clone(), repo.to_string());
        root_id
    }

    /// Synchronous full-tree scan of every registered root, used at startup
    /// and by explicit rescan requests.
    pub fn scan_once(&self) -> Result<()> {
        let resolver = self.resolver.read().expect("resolver lock poisoned");
        let repos = self.repos.read().expect("repos lock poisoned");
        let conn = self.read_conn.lock().expect("read conn lock poisoned");

        for root_id in resolver.root_ids() {
            let Some(root_path) = resolver.canonical_path(root_id) else {
                continue;
            };
            let repo = repos.get(root_id).map(String::as_str).unwrap_or(root_id);
            let outcome = scanner::scan_once(
                &conn,
                &self.registry,
                root_id,
                root_path,
                repo,
                self.config.include.as_ref(),
                self.config.exclude.as_ref(),
                self.config.size_limits,
                self.config.decode_policy,
                self.config.sampling_enabled,
            )?;
            tracing::info!(
                root_id,
                seen = outcome.files_seen,
                changed = outcome.files_changed,
                deleted = outcome.files_deleted,
                "scan complete"
            );
            for task in outcome.tasks {
                self.writer.enqueue(task);
            }
        }
        Ok(())
    }

    pub fn request_rescan(&self) {
        self.rescan_requested.store(true, Ordering::SeqCst);
    }

    /// Marks a search as in flight so the drain loop throttles background
    /// indexing for the configured grace window.
    pub fn notify_search_start(&self) {
        self.coordinator.notify_search_start();
    }

    pub fn notify_search_end(&self) {
        self.coordinator.notify_search_end();
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(mut watcher) = self.watcher.lock().expect("watcher lock poisoned").take() {
            watcher.stop();
        }
        let mut threads = self.threads.lock().expect("threads lock poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Starts the watcher, the coalesce-drain pump, and the DLQ poll loop,
    /// runs an initial scan if configured, then blocks until `stop()`.
    pub fn run_forever(self: &Arc<Self>) -> Result<()> {
        let roots: Vec<PathBuf> = {
            let resolver = self.resolver.read().expect("resolver lock poisoned");
            resolver
                .root_ids()
                .filter_map(|id| resolver.canonical_path(id).map(Path::to_path_buf))
                .collect()
        };

        if !roots.is_empty() {
            let sink = Arc::new(Sink {
                queue: self.queue.clone(),
                resolver_paths: self.resolver.clone(),
            });
            let mut watcher = FsWatcher::new(roots, sink, self.config.watch_config.clone())?;
            watcher.start()?;
            *self.watcher.lock().expect("watcher lock poisoned") = Some(watcher);
        }

        self.spawn_dlq_loop();
        self.spawn_drain_loop();

        if self.config.startup_index {
            self.scan_once()?;
        }

        while !self.stop.load(Ordering::SeqCst) {
            std::thread::sleep(self.config.scan_interval.min(Duration::from_secs(1)));
            if self.rescan_requested.swap(false, Ordering::SeqCst) {
                self.scan_once()?;
            }
        }
        Ok(())
    }

    fn spawn_dlq_loop(self: &Arc<Self>) {
        let worker = self.clone();
        let handle = std::thread::Builder::new()
            .name("sari-dlq".into())
            .spawn(move || {
                while !worker.stop.load(Ordering::SeqCst) {
                    std::thread::sleep(worker.config.dlq_poll_interval.max(Duration::from_secs(5)));
                    if worker.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Err(e) = worker.poll_dlq() {
                        tracing::warn!(error = %e, "dlq poll failed");
                    }
                }
            })
            .expect("spawn dlq loop");
        self.threads.lock().expect("threads lock poisoned").push(handle);
    }

    fn poll_dlq(&self) -> Result<()> {
        let ready = {
            let conn = self.read_conn.lock().expect("read conn lock poisoned");
            dlq::list_ready(&conn, now_ts(), 50)?
        };
        if ready.is_empty() {
            return Ok(());
        }
        let mut promoted = Vec::with_capacity(ready.len());
        for task in &ready {
            promoted.push(dlq::promote(task));
            self.queue.enqueue(&task.db_path, CoalesceAction::Index, now_ts());
        }
        self.writer.enqueue(DbTask::new(TaskKind::DlqUpsert { rows: promoted }));
        Ok(())
    }

    /// Feeds drained coalesce-queue tasks through the scheduling coordinator
    /// so a burst of watch events doesn't starve other roots, and so
    /// indexing backs off for a grace window after a search comes in.
    fn spawn_drain_loop(self: &Arc<Self>) {
        let worker = self.clone();
        let handle = std::thread::Builder::new()
            .name("sari-index-drain".into())
            .spawn(move || {
                while !worker.stop.load(Ordering::SeqCst) {
                    let drained = worker.queue.drain(64);
                    for task in drained {
                        let root_id = task.db_path.split('/').next().unwrap_or_default().to_string();
                        worker.coordinator.enqueue_fair(root_id, task);
                    }

                    let mut dispatched = 0;
                    while dispatched < 64 {
                        let penalty = worker.coordinator.get_sleep_penalty();
                        if !penalty.is_zero() {
                            std::thread::sleep(penalty);
                        }
                        let Some((_, task)) = worker.coordinator.get_next_task() else {
                            break;
                        };
                        if let Err(e) = worker.handle_index_task(&task) {
                            tracing::warn!(db_path = %task.db_path, error = %e, "index task failed");
                            worker.retry_or_dlq(&task, &e.to_string());
                        }
                        dispatched += 1;
                    }
                    if dispatched == 0 {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            })
            .expect("spawn drain loop");
        self.threads.lock().expect("threads lock poisoned").push(handle);
    }

    fn handle_index_task(&self, task: &sari_model::CoalesceTask) -> Result<()> {
        let resolver = self.resolver.read().expect("resolver lock poisoned");
        let Some((root_id, rel_path)) = task.db_path.split_once('/').map(|(r, p)| (r.to_string(), p.to_string()))
        else {
            return Ok(());
        };
        let Some(root_path) = resolver.canonical_path(&root_id) else {
            return Ok(());
        };
        let fs_path = root_path.join(&rel_path);

        if task.action == CoalesceAction::Delete {
            self.writer.enqueue(DbTask::new(TaskKind::DeletePath {
                db_path: task.db_path.clone(),
                engine_delete: true,
            }));
            return Ok(());
        }

        let repos = self.repos.read().expect("repos lock poisoned");
        let repo = repos.get(&root_id).cloned().unwrap_or_else(|| root_id.clone());
        drop(repos);

        let tasks = self.index_file_with_timeout(fs_path, task.db_path.clone(), root_id, rel_path, repo)?;

        match tasks {
            Some(tasks) => {
                for t in tasks {
                    self.writer.enqueue(t);
                }
            }
            None => {
                self.writer.enqueue(DbTask::new(TaskKind::DeletePath {
                    db_path: task.db_path.clone(),
                    engine_delete: true,
                }));
            }
        }
        Ok(())
    }

    /// Bounds a single file's classify+parse call by `parse_timeout`: the
    /// call runs on a small fixed-size worker pool (`parse_timeout_workers`)
    /// rather than a thread spawned per call, so a pile-up of slow files
    /// can't grow unboundedly many OS threads. On timeout the in-flight job
    /// is abandoned (its eventual result is discarded once the pool gets to
    /// it) and a `ParseTimeout` error is returned, which the caller routes
    /// through the normal retry/DLQ path.
    fn index_file_with_timeout(
        &self,
        fs_path: PathBuf,
        db_path_str: String,
        root_id: String,
        rel_path: String,
        repo: String,
    ) -> Result<Option<Vec<DbTask>>> {
        if self.config.parse_timeout.is_zero() {
            return scanner::index_file(
                &fs_path,
                &db_path_str,
                &root_id,
                &rel_path,
                &repo,
                self.config.include.as_ref(),
                self.config.exclude.as_ref(),
                self.config.size_limits,
                self.config.decode_policy,
                self.config.sampling_enabled,
                &self.registry,
            )
            .map_err(IndexError::Io);
        }

        let registry = self.registry.clone();
        let include = self.config.include.clone();
        let exclude = self.config.exclude.clone();
        let limits = self.config.size_limits;
        let decode_policy = self.config.decode_policy;
        let sampling_enabled = self.config.sampling_enabled;
        let timeout = self.config.parse_timeout;
        let db_path_for_error = db_path_str.clone();

        let (tx, rx) = std::sync::mpsc::channel();
        self.parse_pool.spawn(move || {
            let result = scanner::index_file(
                &fs_path,
                &db_path_str,
                &root_id,
                &rel_path,
                &repo,
                include.as_ref(),
                exclude.as_ref(),
                limits,
                decode_policy,
                sampling_enabled,
                &registry,
            );
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(IndexError::Io),
            Err(_) => Err(IndexError::ParseTimeout(db_path_for_error)),
        }
    }

    /// I/O-kind failures get a few short, jittered retries via re-enqueue;
    /// anything still failing lands in the DLQ.
    fn retry_or_dlq(&self, task: &sari_model::CoalesceTask, error: &str) {
        const MAX_RETRIES: u32 = 2;
        if task.attempts < MAX_RETRIES {
            let backoff = dlq::retry_backoff(task.attempts + 1);
            let queue = self.queue.clone();
            let db_path_owned = task.db_path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(backoff);
                queue.enqueue(&db_path_owned, CoalesceAction::Index, now_ts());
            });
        } else {
            let failed = dlq::record_failed_task(&task.db_path, error, task.attempts + 1);
            self.writer.enqueue(DbTask::new(TaskKind::DlqUpsert { rows: vec![failed] }));
        }
    }
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build a `"<root_id>/<rel_path>"` db-path, re-exported for callers wiring
/// roots before the worker has resolved any events yet.
pub fn make_db_path(root_id: &str, rel_path: &str) -> String {
    db_path(root_id, rel_path).as_str().to_string()
}
