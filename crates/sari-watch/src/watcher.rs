//! Filesystem watcher and debouncer.
//!
//! Wraps `notify::RecommendedWatcher` with an mpsc channel and a background
//! processor thread watching a registered set of roots. Two separate
//! debounce windows apply to ordinary paths and git-checkout paths, and a
//! health-check supervisor thread restarts the underlying observer if it
//! dies.

use crate::error::{Result, WatchError};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use sari_model::{FsEvent, FsEventKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const GIT_MARKER_NAMES: &[&str] = ["HEAD", "index", "packed-refs", "ORIG_HEAD", "FETCH_HEAD"];

fn is_git_event(path: &Path) -> bool {
    if path.components().any(|c| c.as_os_str() == ".git") {
        return true;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| GIT_MARKER_NAMES.contains(&n))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce: Duration,
    pub git_debounce: Duration,
    pub monitor_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            debounce: Duration::from_secs(1),
            git_debounce: Duration::from_secs(3),
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// Sink the watcher delivers classified events to. `on_git_event` receives
/// only the most recent path once the git debounce window elapses.
pub trait WatchSink: Send + Sync {
    fn on_event(&self, event: FsEvent);
    fn on_git_event(&self, path: PathBuf);
}

pub struct FsWatcher {
    config: WatchConfig,
    roots: Vec<PathBuf>,
    sink: Arc<dyn WatchSink>,
    running: Arc<AtomicBool>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    processor: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl FsWatcher {
    pub fn new(roots: Vec<PathBuf>, sink: Arc<dyn WatchSink>, config: WatchConfig) -> Result<Self> {
        for root in &roots {
            if !root.exists() {
                return Err(WatchError::RootNotFound(root.display().to_string()));
            }
            if !root.is_dir() {
                return Err(WatchError::RootNotDirectory(root.display().to_string()));
            }
        }
        Ok(FsWatcher {
            config,
            roots,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            watcher: Arc::new(Mutex::new(None)),
            processor: None,
            monitor: None,
        })
    }

    /// Start watching. If the underlying notification mechanism can't be
    /// created, this logs and returns `Ok` — periodic full scans still
    /// cover correctness.
    pub fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let (tx, rx) = channel();

        if let Err(e) = self.bind_observer(tx.clone()) {
            tracing::warn!(error = %e, "watcher unavailable; relying on periodic scans");
        }

        let sink = self.sink.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        self.processor = Some(thread::spawn(move || {
            process_events(rx, sink, config, running);
        }));

        let roots = self.roots.clone();
        let watcher_slot = self.watcher.clone();
        let running = self.running.clone();
        let monitor_tx = tx;
        let interval = self.config.monitor_interval;
        self.monitor = Some(thread::spawn(move || {
            health_loop(roots, watcher_slot, running, monitor_tx, interval);
        }));

        Ok(())
    }

    fn bind_observer(&self, tx: Sender<Event>) -> Result<()> {
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| WatchError::WatcherInit(e.to_string()))?;

        for root in &self.roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| WatchError::WatchFailed {
                    path: root.display().to_string(),
                    source,
                })?;
        }
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        *self.watcher.lock() = None;
        if let Some(h) = self.processor.take() {
            let _ = h.join();
        }
        if let Some(h) = self.monitor.take() {
            let _ = h.join();
        }
    }
}

fn health_loop(
    roots: Vec<PathBuf>,
    watcher_slot: Arc<Mutex<Option<RecommendedWatcher>>>,
    running: Arc<AtomicBool>,
    tx: Sender<Event>,
    interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let dead = watcher_slot.lock().is_none();
        if dead {
            tracing::warn!("watcher observer missing; attempting restart");
            match rebuild(&roots, tx.clone()) {
                Ok(w) => *watcher_slot.lock() = Some(w),
                Err(e) => tracing::error!(error = %e, "watcher restart failed"),
            }
        }
    }
}

fn rebuild(roots: &[PathBuf], tx: Sender<Event>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|e| WatchError::WatcherInit(e.to_string()))?;
    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchFailed {
                path: root.display().to_string(),
                source,
            })?;
    }
    Ok(watcher)
}

fn classify(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(FsEventKind::Moved),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Deleted),
        _ => None,
    }
}

fn process_events(
    rx: Receiver<Event>,
    sink: Arc<dyn WatchSink>,
    config: WatchConfig,
    running: Arc<AtomicBool>,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut git_pending: Option<(PathBuf, Instant)> = None;

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                let Some(kind) = classify(&event.kind) else { continue };
                if event.paths.is_empty() {
                    continue;
                }
                let path = event.paths[0].clone();
                let dest_path = if kind == FsEventKind::Moved && event.paths.len() > 1 {
                    Some(event.paths[1].clone())
                } else {
                    None
                };

                if is_git_event(&path) {
                    git_pending = Some((path, Instant::now()));
                    continue;
                }

                let now = Instant::now();
                let should_emit = pending
                    .get(&path)
                    .map(|last| now.duration_since(*last) >= config.debounce)
                    .unwrap_or(true);
                pending.insert(path.clone(), now);
                if should_emit {
                    sink.on_event(FsEvent {
                        kind,
                        path,
                        dest_path,
                        ts: now_ts(),
                    });
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                pending.retain(|_, last| now.duration_since(*last) < config.debounce * 2);
                if let Some((path, last)) = git_pending.take() {
                    if now.duration_since(last) >= config.git_debounce {
                        sink.on_git_event(path);
                    } else {
                        git_pending = Some((path, last));
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
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

    #[test]
    fn git_dir_segment_is_detected() {
        assert!(is_git_event(Path::new("/repo/.git/HEAD")));
        assert!(is_git_event(Path::new("/repo/.git/refs/heads/main")));
    }

    #[test]
    fn git_marker_basename_is_detected() {
        assert!(is_git_event(Path::new("/repo/packed-refs")));
        assert!(!is_git_event(Path::new("/repo/src/main.rs")));
    }
}
