//! Deduplicating, rate-limited work queue with single-flight processing
//!
//! Every item is in at most one of three states:
//! - queued: waiting in FIFO order to be handed out by [`WorkQueue::get`]
//! - processing: handed out and not yet released by [`WorkQueue::done`]
//! - dirty: needs processing; queued, or re-queued once processing ends
//!
//! An item is never queued twice and never handed to two consumers at once.

pub mod rate_limiter;

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

pub use rate_limiter::{
    default_controller_rate_limiter, ItemExponentialBackoff, MaxOf, RateLimiter, TokenBucket,
};

/// Cheaply cloneable handle to a shared work queue
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
    rate_limiter: Box<dyn RateLimiter<K>>,
}

impl<K: Clone + Eq + Hash> State<K> {
    /// Returns true when the item became visible to consumers
    fn insert(&mut self, item: K) -> bool {
        if self.shutting_down || self.dirty.contains(&item) {
            return false;
        }
        self.dirty.insert(item.clone());
        if self.processing.contains(&item) {
            return false;
        }
        self.queue.push_back(item);
        true
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, rate_limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                    rate_limiter: Box::new(rate_limiter),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Mark `item` as needing processing.
    ///
    /// No-op if it is already queued. If it is being processed it is
    /// re-queued when [`WorkQueue::done`] is called for it.
    pub async fn add(&self, item: K) {
        let visible = self.inner.state.lock().await.insert(item);
        if visible {
            self.inner.notify.notify_one();
        }
    }

    /// Add `item` once `delay` has elapsed
    pub async fn add_after(&self, item: K, delay: Duration) {
        if delay.is_zero() {
            return self.add(item).await;
        }
        if self.is_shutting_down().await {
            return;
        }
        trace!(queue = %self.inner.name, ?item, ?delay, "Delaying add");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item).await;
        });
    }

    /// Add `item` after the delay its rate limiter computes.
    ///
    /// Delays grow with each call until [`WorkQueue::forget`] is called.
    pub async fn add_rate_limited(&self, item: K) {
        let delay = {
            let mut state = self.inner.state.lock().await;
            if state.shutting_down {
                return;
            }
            state.rate_limiter.when(&item)
        };
        debug!(queue = %self.inner.name, ?item, ?delay, "Requeueing with backoff");
        self.add_after(item, delay).await;
    }

    /// Wait for the next item and mark it as processing.
    ///
    /// Returns `None` once the queue is shut down and drained. Every item
    /// returned must be released with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock().await;
                if let Some(item) = state.queue.pop_front() {
                    state.processing.insert(item.clone());
                    state.dirty.remove(&item);
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release an item handed out by [`WorkQueue::get`]
    pub async fn done(&self, item: &K) {
        let requeued = {
            let mut state = self.inner.state.lock().await;
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    /// Clear the backoff history of `item`
    pub async fn forget(&self, item: &K) {
        self.inner.state.lock().await.rate_limiter.forget(item);
    }

    /// Rate-limited adds of `item` since it was last forgotten
    pub async fn num_requeues(&self, item: &K) -> u32 {
        self.inner.state.lock().await.rate_limiter.num_requeues(item)
    }

    /// Number of items visible to consumers
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop accepting new items. Consumers drain what is already queued,
    /// then [`WorkQueue::get`] returns `None`.
    pub async fn shut_down(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        debug!(queue = %self.inner.name, "Shutting down work queue");
        self.inner.notify.notify_waiters();
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().await.shutting_down
    }
}
