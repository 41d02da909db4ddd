//! Deduplicating, rate-limited work queue feeding the reconcile workers.
//!
//! A key is handed to at most one worker at a time. Adding a key that is
//! already queued is a no-op, and adding a key that is being processed marks
//! it dirty so it is queued again once the worker calls [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }
}

#[derive(Debug)]
struct QueueInner<K> {
    state: Mutex<QueueState<K>>,
    ready: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

/// Cloneable handle to one shared queue.
#[derive(Debug)]
pub struct WorkQueue<K> {
    inner: Arc<QueueInner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Creates a queue whose error backoff doubles from `base_delay` up to `max_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                ready: Notify::new(),
                base_delay,
                max_delay,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a key for processing.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }

        if state.processing.contains(&key) {
            return;
        }

        state.queue.push_back(key);
        drop(state);
        self.inner.ready.notify_one();
    }

    /// Queues a key once the delay has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        if self.is_shutting_down() {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Queues a key after its next exponential backoff delay.
    pub fn add_rate_limited(&self, key: K) {
        let failures = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };

        let delay = backoff_delay(self.inner.base_delay, self.inner.max_delay, failures);
        self.add_after(key, delay);
    }

    /// Clears the backoff history of a key.
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Number of consecutive rate-limited requeues of a key.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or_default()
    }

    /// Waits for the next key, or returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let ready = self.inner.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.ready.notify_one();
                    }
                    return Some(key);
                }

                if state.shutting_down {
                    return None;
                }
            }

            ready.await;
        }
    }

    /// Marks a key as processed, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.ready.notify_one();
        }
    }

    /// Stops accepting keys and wakes every waiting worker.
    pub fn shutdown(&self) {
        self.state().shutting_down = true;
        self.inner.ready.notify_waiters();
    }

    fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}

/// Delay before the `failures`-th retry: `base * 2^(failures - 1)`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    base.checked_mul(1_u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}
