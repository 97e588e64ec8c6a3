//! Multi-server request dispatch.
//!
//! A dispatch snapshots the servers eligible for a request, filters them by
//! advertised capability, and issues the request to every survivor in
//! parallel. Each server's outcome is pushed into a result queue the moment
//! it arrives, so consumers see fast servers' results while slow servers are
//! still working. One server failing, timing out, or panicking never
//! disturbs its siblings; it contributes an error marker instead of a value.

use crate::capability::CapabilityFilter;
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::error::ServerFailure;
use crate::registry::ServerBinding;
use crate::registry::ServerRegistry;
use lsp_types::Uri;
use quorum_async_utils::CancelHandle;
use quorum_async_utils::CancellableTask;
use quorum_async_utils::TaskError;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

/// One server's contribution to a dispatch, consumed exactly once.
#[derive(Debug)]
pub struct PartialResult<R> {
    pub server: ServerBinding,
    pub payload: Result<R, ServerFailure>,
    issued: CancelHandle,
}

impl<R> PartialResult<R> {
    /// True once the request that produced this result has been cancelled.
    /// Consumers check this at consumption time; a result enqueued just
    /// before its task was cancelled must not be delivered.
    pub fn is_cancelled(&self) -> bool {
        self.issued.is_cancelled()
    }
}

/// Terminal accounting for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failures: Vec<ServerFailure>,
}

/// A running dispatch: the fan-in task plus the live result queue.
///
/// Cancelling the handle cancels every per-server child through the task
/// cascade. The queue closes once every child has either contributed its
/// item or been cancelled.
pub struct DispatchHandle<R> {
    task: CancellableTask<Result<DispatchSummary, LifecycleError>>,
    rx: mpsc::Receiver<PartialResult<R>>,
    server_count: usize,
    poll_interval: std::time::Duration,
}

impl<R> DispatchHandle<R> {
    /// Number of servers the request was actually issued to.
    pub fn server_count(&self) -> usize {
        self.server_count
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        self.task.handle()
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Receives the next partial result, `None` once the queue is exhausted.
    /// Most consumers use the draining loop in
    /// [`drain`](DispatchHandle::drain) instead.
    pub async fn recv(&mut self) -> Option<PartialResult<R>> {
        self.rx.recv().await
    }

    pub(crate) fn queue_mut(&mut self) -> &mut mpsc::Receiver<PartialResult<R>> {
        &mut self.rx
    }

    pub(crate) fn into_task(self) -> CancellableTask<Result<DispatchSummary, LifecycleError>> {
        self.task
    }

    pub(crate) fn poll_interval(&self) -> std::time::Duration {
        self.poll_interval
    }

    /// Waits for every per-server request to settle and returns the terminal
    /// accounting. Fails with [`LifecycleError::AllServersFailed`] only when
    /// at least one server was dispatched and every one of them failed.
    pub async fn join(self) -> Result<DispatchSummary, LifecycleError> {
        match self.task.join().await {
            Ok(outcome) => outcome,
            Err(TaskError::Cancelled) => Err(LifecycleError::Cancelled),
            Err(TaskError::Failed(message)) => Err(LifecycleError::TaskPanicked(message)),
        }
    }
}

/// Issues one logical request to many servers at once.
#[derive(Clone)]
pub struct MultiServerDispatcher {
    registry: ServerRegistry,
    config: LifecycleConfig,
}

impl MultiServerDispatcher {
    pub fn new(registry: ServerRegistry, config: LifecycleConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Dispatches to the servers bound to `document` that pass `filter`.
    pub async fn dispatch<R, F, Fut>(
        &self,
        document: &Uri,
        filter: &CapabilityFilter,
        request_fn: F,
    ) -> DispatchHandle<R>
    where
        R: Send + 'static,
        F: Fn(ServerBinding) -> Fut,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let servers = self.registry.bound_servers(document).await;
        self.dispatch_to(servers, filter, request_fn)
    }

    /// Dispatches to every registered server that passes `filter`, for
    /// workspace-scoped requests that are not tied to one document.
    pub async fn dispatch_all<R, F, Fut>(
        &self,
        filter: &CapabilityFilter,
        request_fn: F,
    ) -> DispatchHandle<R>
    where
        R: Send + 'static,
        F: Fn(ServerBinding) -> Fut,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let servers = self.registry.all_servers().await;
        self.dispatch_to(servers, filter, request_fn)
    }

    /// Dispatches to an explicit server snapshot. Servers still initializing
    /// or rejected by `filter` are dropped silently: they get no queue entry
    /// and are never awaited.
    pub fn dispatch_to<R, F, Fut>(
        &self,
        servers: Vec<ServerBinding>,
        filter: &CapabilityFilter,
        request_fn: F,
    ) -> DispatchHandle<R>
    where
        R: Send + 'static,
        F: Fn(ServerBinding) -> Fut,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let candidates = servers.len();
        let selected: Vec<ServerBinding> = servers
            .into_iter()
            .filter(|binding| filter.accepts(binding))
            .collect();
        let server_count = selected.len();
        debug!(
            "dispatching {} to {server_count} of {candidates} servers",
            filter.label()
        );

        let (tx, rx) = mpsc::channel::<PartialResult<R>>(server_count.max(1));
        let parent = CancelHandle::new();
        let request_timeout = self.config.request_timeout();
        let timeout_ms = self.config.request_timeout_ms;

        let mut children = Vec::with_capacity(server_count);
        for binding in selected {
            let child_handle = parent.child();
            let issued = child_handle.clone();
            let tx = tx.clone();
            let request = request_fn(binding.clone());
            let server_id = binding.id.clone();
            let for_parent = binding.clone();
            let child = CancellableTask::spawn_with_handle(child_handle, async move {
                let payload = match tokio::time::timeout(request_timeout, request).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(message)) => Err(ServerFailure {
                        server: server_id,
                        message,
                    }),
                    Err(_) => Err(ServerFailure {
                        server: server_id,
                        message: format!("request timed out after {timeout_ms}ms"),
                    }),
                };
                if let Err(failure) = &payload {
                    warn!("server request failed: {failure}");
                }
                let outcome = payload.as_ref().map(|_| ()).map_err(Clone::clone);
                // Queue capacity covers one item per server, so this send
                // never blocks on the consumer.
                let _ = tx
                    .send(PartialResult {
                        server: binding,
                        payload,
                        issued,
                    })
                    .await;
                outcome
            });
            children.push((for_parent, child.handle().clone(), child));
        }

        let filter_label = filter.label();
        let task = CancellableTask::spawn_with_handle(parent, async move {
            let mut summary = DispatchSummary {
                dispatched: server_count,
                succeeded: 0,
                failures: Vec::new(),
            };
            for (server, issued, child) in children {
                match child.join().await {
                    Ok(Ok(())) => summary.succeeded += 1,
                    Ok(Err(failure)) => summary.failures.push(failure),
                    Err(TaskError::Cancelled) => {}
                    Err(TaskError::Failed(message)) => {
                        warn!("request task for server {} panicked: {message}", server.id);
                        let failure = ServerFailure {
                            server: server.id.clone(),
                            message,
                        };
                        // A panicked child never reached its send; enqueue
                        // the marker on its behalf.
                        let _ = tx
                            .send(PartialResult {
                                server,
                                payload: Err(failure.clone()),
                                issued,
                            })
                            .await;
                        summary.failures.push(failure);
                    }
                }
            }
            drop(tx);
            debug!(
                "{filter_label} dispatch settled: {}/{} servers succeeded",
                summary.succeeded, summary.dispatched
            );
            if summary.dispatched > 0 && summary.failures.len() == summary.dispatched {
                Err(LifecycleError::AllServersFailed(summary.failures))
            } else {
                Ok(summary)
            }
        });

        DispatchHandle {
            task,
            rx,
            server_count,
            poll_interval: self.config.poll_interval(),
        }
    }
}
