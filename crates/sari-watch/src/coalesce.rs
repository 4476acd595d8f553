//! Coalesce queue: translates bursty FsEvents into at-most-one pending task
//! per db-path, sharded for enqueue concurrency and bounded in size.
//!
//! Each shard is a `Mutex<HashMap<..>>`, picked by a SHA1-based hash of the
//! db-path, plus a dedup wake-up queue and an atomic size counter.

use parking_lot::Mutex;
use sari_model::{CoalesceAction, CoalesceTask, FsEvent, FsEventKind, PathResolver};
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct CoalesceMetrics {
    pub drop_degraded: u64,
}

struct Shard {
    tasks: Mutex<HashMap<String, CoalesceTask>>,
}

/// Sharded map of pending per-path tasks plus a dedup wake-up queue, bounded
/// by `max_keys`.
pub struct CoalesceQueue {
    shards: Vec<Shard>,
    size: AtomicUsize,
    max_keys: usize,
    wake: Mutex<(VecDeque<String>, HashSet<String>)>,
    metrics: Mutex<CoalesceMetrics>,
}

impl CoalesceQueue {
    pub fn new(shard_count: usize, max_keys: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Shard {
                tasks: Mutex::new(HashMap::new()),
            })
            .collect();
        CoalesceQueue {
            shards,
            size: AtomicUsize::new(0),
            max_keys,
            wake: Mutex::new((VecDeque::new(), HashSet::new())),
            metrics: Mutex::new(CoalesceMetrics::default()),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = Sha1::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let idx = digest[0] as usize % self.shards.len();
        &self.shards[idx]
    }

    /// Merge DELETE-absorbing actions into any pending task for this path,
    /// enforce the size cap on genuinely new keys, then publish to the
    /// wake-up queue.
    pub fn enqueue(&self, db_path: &str, action: CoalesceAction, now_ts: i64) {
        let shard = self.shard_for(db_path);
        let mut tasks = shard.tasks.lock();

        match tasks.get_mut(db_path) {
            Some(existing) => {
                existing.action = existing.action.merge(action);
                existing.last_seen_ts = now_ts;
            }
            None => {
                if self.size.load(Ordering::SeqCst) >= self.max_keys {
                    self.metrics.lock().drop_degraded += 1;
                    return;
                }
                tasks.insert(
                    db_path.to_string(),
                    CoalesceTask {
                        action,
                        db_path: db_path.to_string(),
                        attempts: 0,
                        enqueue_ts: now_ts,
                        last_seen_ts: now_ts,
                    },
                );
                self.size.fetch_add(1, Ordering::SeqCst);
            }
        }
        drop(tasks);

        let mut wake = self.wake.lock();
        if wake.1.insert(db_path.to_string()) {
            wake.0.push_back(db_path.to_string());
        }
    }

    /// Pull up to `limit` keys from the wake-up queue, remove each task
    /// from its shard, and return it for dispatch.
    pub fn drain(&self, limit: usize) -> Vec<CoalesceTask> {
        let keys: Vec<String> = {
            let mut wake = self.wake.lock();
            let mut out = Vec::with_capacity(limit.min(wake.0.len()));
            while out.len() < limit {
                match wake.0.pop_front() {
                    Some(key) => {
                        wake.1.remove(&key);
                        out.push(key);
                    }
                    None => break,
                }
            }
            out
        };

        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            let shard = self.shard_for(&key);
            if let Some(task) = shard.tasks.lock().remove(&key) {
                self.size.fetch_sub(1, Ordering::SeqCst);
                drained.push(task);
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CoalesceMetrics {
        *self.metrics.lock()
    }
}

/// Resolve a raw `FsEvent` against the path resolver and enqueue it,
/// splitting MOVED events into `(DELETE, src) + (INDEX, dest)` first (spec
/// §4.2 point 2). Drops the event if its path is not within any known root.
pub fn dispatch_fs_event(queue: &CoalesceQueue, resolver: &PathResolver, event: &FsEvent) {
    if event.kind == FsEventKind::Moved {
        if let Some(db_path) = resolver.to_db_path(&event.path) {
            queue.enqueue(db_path.as_str(), CoalesceAction::Delete, event.ts);
        }
        if let Some(dest) = &event.dest_path {
            if let Some(db_path) = resolver.to_db_path(dest) {
                queue.enqueue(db_path.as_str(), CoalesceAction::Index, event.ts);
            }
        }
        return;
    }

    let Some(db_path) = resolver.to_db_path(&event.path) else {
        return;
    };
    let action = match event.kind {
        FsEventKind::Deleted => CoalesceAction::Delete,
        _ => CoalesceAction::Index,
    };
    queue.enqueue(db_path.as_str(), action, event.ts);
}

/// Default shard count and default size bound.
pub fn default_queue() -> CoalesceQueue {
    CoalesceQueue::new(16, 100_000)
}

pub type SharedCoalesceQueue = Arc<CoalesceQueue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_absorbs_pending_index() {
        let q = CoalesceQueue::new(4, 100);
        q.enqueue("r1/a.py", CoalesceAction::Index, 1);
        q.enqueue("r1/a.py", CoalesceAction::Delete, 2);
        let drained = q.drain(10);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].action, CoalesceAction::Delete);
    }

    #[test]
    fn repeat_enqueue_same_key_dedupes_wake_queue() {
        let q = CoalesceQueue::new(4, 100);
        q.enqueue("r1/a.py", CoalesceAction::Index, 1);
        q.enqueue("r1/a.py", CoalesceAction::Index, 2);
        assert_eq!(q.len(), 1);
        let drained = q.drain(10);
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn size_cap_drops_new_keys_and_counts_degraded() {
        let q = CoalesceQueue::new(4, 1);
        q.enqueue("r1/a.py", CoalesceAction::Index, 1);
        q.enqueue("r1/b.py", CoalesceAction::Index, 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.metrics().drop_degraded, 1);
    }

    #[test]
    fn moved_event_splits_into_delete_and_index() {
        use std::path::Path;

        let mut resolver = PathResolver::new();
        resolver.register_root(Path::new("/workspace/proj"));
        let q = CoalesceQueue::new(4, 100);
        let event = FsEvent {
            kind: FsEventKind::Moved,
            path: Path::new("/workspace/proj/old.py").to_path_buf(),
            dest_path: Some(Path::new("/workspace/proj/new.py").to_path_buf()),
            ts: 1,
        };
        dispatch_fs_event(&q, &resolver, &event);

        let drained = q.drain(10);
        assert_eq!(drained.len(), 2);
        let delete = drained.iter().find(|t| t.db_path.ends_with("old.py")).unwrap();
        assert_eq!(delete.action, CoalesceAction::Delete);
        let index = drained.iter().find(|t| t.db_path.ends_with("new.py")).unwrap();
        assert_eq!(index.action, CoalesceAction::Index);
    }

    #[test]
    fn drain_removes_tasks_from_map() {
        let q = CoalesceQueue::new(4, 100);
        q.enqueue("r1/a.py", CoalesceAction::Index, 1);
        let drained = q.drain(10);
        assert_eq!(drained.len(), 1);
        assert!(q.is_empty());
        assert!(q.drain(10).is_empty());
    }
}
