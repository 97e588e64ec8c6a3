//! Result draining.
//!
//! The drain loop sits between a dispatch's result queue and the consumer.
//! It wakes at least once per poll interval to notice external cancellation
//! and staleness even when no server has produced anything, delivers each
//! arriving result immediately, and re-validates every item against its
//! issuing task at consumption time. Total drain latency tracks the slowest
//! contributing server; filtered and cancelled servers contribute nothing
//! and are never waited for.

use crate::dispatch::DispatchHandle;
use crate::error::LifecycleError;
use crate::error::Result;
use crate::error::ServerFailure;
use crate::registry::ServerBinding;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Consumer-side accounting for a completed drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// Servers the request went out to.
    pub dispatched: usize,
    /// Servers that answered successfully.
    pub succeeded: usize,
    /// Successful results handed to the consumer.
    pub delivered: usize,
    /// Results dropped because their request was cancelled before
    /// consumption.
    pub skipped: usize,
    /// Per-server failures, in arrival order. Never fatal on their own.
    pub failures: Vec<ServerFailure>,
}

impl<R> DispatchHandle<R> {
    /// Drains the dispatch to completion, handing each successful result to
    /// `on_item` as it arrives.
    ///
    /// Between results the loop re-checks `cancel` and `is_stale` once per
    /// poll interval. Either signal stops the drain, cancels the whole
    /// dispatch tree, and returns [`LifecycleError::Cancelled`] or
    /// [`LifecycleError::Superseded`]; results already delivered stay with
    /// the consumer. Returns [`LifecycleError::AllServersFailed`] only when
    /// at least one server was dispatched and all of them failed.
    pub async fn drain<S, F>(
        mut self,
        cancel: &CancellationToken,
        mut is_stale: S,
        mut on_item: F,
    ) -> Result<DrainSummary>
    where
        S: FnMut() -> bool,
        F: FnMut(ServerBinding, R),
    {
        let poll_interval = self.poll_interval();
        let mut delivered = 0usize;
        let mut skipped = 0usize;

        loop {
            if cancel.is_cancelled() {
                debug!("drain cancelled after {delivered} delivered results");
                self.cancel();
                return Err(LifecycleError::Cancelled);
            }
            if is_stale() {
                debug!("drain superseded after {delivered} delivered results");
                self.cancel();
                return Err(LifecycleError::Superseded);
            }

            match timeout(poll_interval, self.queue_mut().recv()).await {
                Ok(Some(item)) => {
                    if item.is_cancelled() {
                        skipped += 1;
                        continue;
                    }
                    match item.payload {
                        Ok(value) => {
                            delivered += 1;
                            on_item(item.server, value);
                        }
                        // Failure markers are accounted for by the dispatch
                        // itself; nothing to hand to the consumer.
                        Err(_) => {}
                    }
                }
                // Queue exhausted and every producer settled.
                Ok(None) => break,
                // Poll tick; go round and re-check the exit conditions.
                Err(_) => {}
            }
        }

        let dispatch = self.into_task().join().await.map_err(LifecycleError::from)??;
        Ok(DrainSummary {
            dispatched: dispatch.dispatched,
            succeeded: dispatch.succeeded,
            delivered,
            skipped,
            failures: dispatch.failures,
        })
    }
}
