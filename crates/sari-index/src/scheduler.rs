//! Scheduling coordinator: aging priority queue plus a per-root fair queue,
//! and the indexing/search throttle policy. `WeightedFairQueue` is a simple
//! per-root round robin.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct AgedTask<T> {
    base_priority: f64,
    enqueued_at: Instant,
    root_id: String,
    payload: T,
}

impl<T> AgedTask<T> {
    fn current_priority(&self, age_factor: f64) -> f64 {
        let wait = self.enqueued_at.elapsed().as_secs_f64();
        self.base_priority - wait * age_factor
    }
}

/// Priority queue with aging to prevent starvation: effective priority
/// drops (meaning "more urgent") the longer a task has waited. Lower value
/// wins, matching the Python reference's min-heap convention.
pub struct AgingPriorityQueue<T> {
    tasks: Mutex<Vec<AgedTask<T>>>,
    age_factor: f64,
}

impl<T> AgingPriorityQueue<T> {
    pub fn new(age_factor: f64) -> Self {
        AgingPriorityQueue {
            tasks: Mutex::new(Vec::new()),
            age_factor,
        }
    }

    pub fn put(&self, root_id: impl Into<String>, payload: T, base_priority: f64) {
        let mut tasks = self.tasks.lock().expect("priority queue lock poisoned");
        tasks.push(AgedTask {
            base_priority,
            enqueued_at: Instant::now(),
            root_id: root_id.into(),
            payload,
        });
    }

    /// Recomputes every task's aged priority and pops the most urgent one.
    pub fn get(&self) -> Option<(String, T)> {
        let mut tasks = self.tasks.lock().expect("priority queue lock poisoned");
        if tasks.is_empty() {
            return None;
        }
        let mut best_idx = 0;
        let mut best_priority = tasks[0].current_priority(self.age_factor);
        for (idx, task) in tasks.iter().enumerate().skip(1) {
            let priority = task.current_priority(self.age_factor);
            if priority < best_priority {
                best_priority = priority;
                best_idx = idx;
            }
        }
        let task = tasks.remove(best_idx);
        Some((task.root_id, task.payload))
    }

    pub fn qsize(&self) -> usize {
        self.tasks.lock().expect("priority queue lock poisoned").len()
    }
}

impl<T> Default for AgingPriorityQueue<T> {
    fn default() -> Self {
        Self::new(0.1)
    }
}

/// Per-root round-robin queue so no single root can starve the others under
/// sustained load (`enqueue_fair` in the reference coordinator).
#[derive(Default)]
pub struct WeightedFairQueue<T> {
    inner: Mutex<FairQueueState<T>>,
}

#[derive(Default)]
struct FairQueueState<T> {
    order: VecDeque<String>,
    queues: std::collections::HashMap<String, VecDeque<T>>,
}

impl<T> WeightedFairQueue<T> {
    pub fn new() -> Self {
        WeightedFairQueue {
            inner: Mutex::new(FairQueueState {
                order: VecDeque::new(),
                queues: std::collections::HashMap::new(),
            }),
        }
    }

    pub fn put(&self, root_id: impl Into<String>, payload: T) {
        let root_id = root_id.into();
        let mut state = self.inner.lock().expect("fair queue lock poisoned");
        if !state.queues.contains_key(&root_id) {
            state.order.push_back(root_id.clone());
            state.queues.insert(root_id.clone(), VecDeque::new());
        }
        state.queues.get_mut(&root_id).expect("just inserted").push_back(payload);
    }

    pub fn get(&self) -> Option<(String, T)> {
        let mut state = self.inner.lock().expect("fair queue lock poisoned");
        for _ in 0..state.order.len() {
            let root_id = state.order.pop_front()?;
            let drained_empty = {
                let queue = state.queues.get_mut(&root_id)?;
                let item = queue.pop_front();
                if let Some(item) = item {
                    let empty = queue.is_empty();
                    if !empty {
                        state.order.push_back(root_id.clone());
                    } else {
                        state.queues.remove(&root_id);
                    }
                    return Some((root_id, item));
                }
                queue.is_empty()
            };
            if drained_empty {
                state.queues.remove(&root_id);
            }
        }
        None
    }

    pub fn qsize(&self) -> usize {
        let state = self.inner.lock().expect("fair queue lock poisoned");
        state.queues.values().map(VecDeque::len).sum()
    }
}

/// Orchestrates indexing vs search priority. A burst budget lets priority
/// (rescan) tasks run ahead of fair-queue (background scan) tasks without
/// starving the latter outright.
pub struct SchedulingCoordinator<T> {
    priority_queue: AgingPriorityQueue<T>,
    fair_queue: WeightedFairQueue<T>,
    is_searching: AtomicBool,
    last_search_ts_ms: AtomicU64,
    search_grace: Duration,
    priority_burst: Mutex<u32>,
    max_priority_burst: u32,
    started_at: Instant,
}

impl<T> SchedulingCoordinator<T> {
    pub fn new() -> Self {
        SchedulingCoordinator {
            priority_queue: AgingPriorityQueue::new(0.1),
            fair_queue: WeightedFairQueue::new(),
            is_searching: AtomicBool::new(false),
            last_search_ts_ms: AtomicU64::new(0),
            search_grace: Duration::from_secs_f64(2.0),
            priority_burst: Mutex::new(0),
            max_priority_burst: 5,
            started_at: Instant::now(),
        }
    }

    pub fn enqueue_fair(&self, root_id: impl Into<String>, task: T) {
        self.fair_queue.put(root_id, task);
    }

    pub fn enqueue_priority(&self, root_id: impl Into<String>, task: T, base_priority: f64) {
        self.priority_queue.put(root_id, task, base_priority);
    }

    /// Priority queue first, but burst-limited so the fair queue isn't
    /// starved outright under sustained rescan pressure.
    pub fn get_next_task(&self) -> Option<(String, T)> {
        if self.priority_queue.qsize() > 0 {
            let mut burst = self.priority_burst.lock().expect("burst lock poisoned");
            if *burst < self.max_priority_burst || self.fair_queue.qsize() == 0 {
                *burst += 1;
                return self.priority_queue.get();
            }
        }
        *self.priority_burst.lock().expect("burst lock poisoned") = 0;
        self.fair_queue.get()
    }

    pub fn notify_search_start(&self) {
        self.is_searching.store(true, Ordering::SeqCst);
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        self.last_search_ts_ms.store(elapsed_ms, Ordering::SeqCst);
    }

    /// Deliberately a no-op: rapid follow-up searches should extend the
    /// throttle window rather than clear it immediately.
    pub fn notify_search_end(&self) {}

    pub fn should_throttle_indexing(&self) -> bool {
        if !self.is_searching.load(Ordering::SeqCst) {
            return false;
        }
        let now_ms = self.started_at.elapsed().as_millis() as u64;
        let last_ms = self.last_search_ts_ms.load(Ordering::SeqCst);
        let elapsed = Duration::from_millis(now_ms.saturating_sub(last_ms));
        if elapsed > self.search_grace {
            self.is_searching.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn get_sleep_penalty(&self) -> Duration {
        if self.should_throttle_indexing() {
            Duration::from_millis(500)
        } else {
            Duration::ZERO
        }
    }
}

impl<T> Default for SchedulingCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aging_priority_queue_pops_lowest_priority_first() {
        let queue: AgingPriorityQueue<&str> = AgingPriorityQueue::new(0.1);
        queue.put("r1", "low", 10.0);
        queue.put("r2", "high", 1.0);
        let (root, payload) = queue.get().unwrap();
        assert_eq!(root, "r2");
        assert_eq!(payload, "high");
    }

    #[test]
    fn fair_queue_round_robins_across_roots() {
        let queue: WeightedFairQueue<&str> = WeightedFairQueue::new();
        queue.put("r1", "a1");
        queue.put("r1", "a2");
        queue.put("r2", "b1");
        let first = queue.get().unwrap();
        let second = queue.get().unwrap();
        assert_ne!(first.0, second.0);
    }

    #[test]
    fn coordinator_prefers_priority_queue_within_burst() {
        let coordinator: SchedulingCoordinator<&str> = SchedulingCoordinator::new();
        coordinator.enqueue_fair("r1", "background");
        coordinator.enqueue_priority("r1", "rescan", 1.0);
        let (_, payload) = coordinator.get_next_task().unwrap();
        assert_eq!(payload, "rescan");
    }

    #[test]
    fn throttle_clears_after_grace_period() {
        let coordinator: SchedulingCoordinator<&str> = SchedulingCoordinator::new();
        assert!(!coordinator.should_throttle_indexing());
        coordinator.notify_search_start();
        assert!(coordinator.should_throttle_indexing());
    }
}
