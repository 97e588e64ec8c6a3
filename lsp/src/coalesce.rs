//! Request coalescing.
//!
//! At most one live request exists per logical key. Submitting a new request
//! for a key cancels whatever still occupies it, inside the same critical
//! section that installs the replacement, so two racing submits can never
//! both stay live. The factory runs under the lock and must only construct
//! the task; the request itself runs on the spawned task afterwards.

use quorum_async_utils::CancelHandle;
use quorum_async_utils::CancellableTask;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::debug;

/// Per-key single-flight registry of in-flight requests.
///
/// The coalescer keeps cancellation handles, not the tasks themselves; the
/// returned [`CancellableTask`] stays with the caller. Slots whose task has
/// reached a terminal state are replaced without cancelling and can be swept
/// with [`RequestCoalescer::purge_finished`].
#[derive(Clone)]
pub struct RequestCoalescer<K> {
    slots: Arc<Mutex<HashMap<K, CancelHandle>>>,
}

impl<K> Default for RequestCoalescer<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> RequestCoalescer<K>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the occupant of `key` with a task built by `factory`.
    ///
    /// The previous occupant, if still live, is cancelled first. A factory
    /// error leaves the slot empty and propagates to the caller alone; from
    /// the outside the failed submit looks like a request that was never
    /// made.
    pub fn submit<T, E, F>(&self, key: K, factory: F) -> Result<CancellableTask<T>, E>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<CancellableTask<T>, E>,
    {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = slots.get(&key) {
            if !previous.is_finished() {
                debug!("superseding in-flight request for {key:?}");
                previous.cancel();
            }
        }
        match factory() {
            Ok(task) => {
                slots.insert(key, task.handle().clone());
                Ok(task)
            }
            Err(err) => {
                slots.remove(&key);
                Err(err)
            }
        }
    }

    /// Cancels the live occupant of `key`, if any. Returns whether a live
    /// request was cancelled.
    pub fn cancel(&self, key: &K) -> bool {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slots.get(key) {
            Some(handle) if !handle.is_finished() && !handle.is_cancelled() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Drops slots whose task has resolved or been cancelled.
    pub fn purge_finished(&self) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.retain(|_, handle| !handle.is_finished() && !handle.is_cancelled());
    }

    pub fn live_requests(&self) -> usize {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slots
            .values()
            .filter(|handle| !handle.is_finished() && !handle.is_cancelled())
            .count()
    }
}
