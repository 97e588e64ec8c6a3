//! Request entry points that tie the lifecycle pieces together.
//!
//! A [`RequestManager`] owns one of each shared component and exposes the
//! operations a host editor drives: feature requests on documents, workspace
//! wide queries, and the lifecycle notifications (edits, closes, server
//! starts and stops) that keep the components consistent.

pub mod completion;
pub mod symbols;

use crate::aggregate::DrainSummary;
use crate::capability::CapabilityFilter;
use crate::coalesce::RequestCoalescer;
use crate::config::LifecycleConfig;
use crate::diagnostics::DiagnosticsStore;
use crate::dispatch::MultiServerDispatcher;
use crate::error::LifecycleError;
use crate::error::Result;
use crate::registry::ServerBinding;
use crate::registry::ServerId;
use crate::registry::ServerRegistry;
use crate::staleness::StalenessTracker;
use lsp_types::PublishDiagnosticsParams;
use lsp_types::ServerCapabilities;
use lsp_types::Uri;
use quorum_async_utils::CancelHandle;
use quorum_async_utils::CancellableTask;
use std::fmt;
use std::future::Future;
use tracing::debug;

/// The feature a request belongs to. Requests coalesce per kind, so a new
/// completion on a document replaces the previous completion but leaves an
/// in-flight hover alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Completion,
    Hover,
    Definition,
    WorkspaceSymbols,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Completion => "completion",
            OperationKind::Hover => "hover",
            OperationKind::Definition => "definition",
            OperationKind::WorkspaceSymbols => "workspace-symbols",
        }
    }

    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Completion,
            OperationKind::Hover,
            OperationKind::Definition,
            OperationKind::WorkspaceSymbols,
        ]
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request ranges over: one open document, or the whole workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestScope {
    Document(Uri),
    Workspace,
}

/// Coalescing key. Two submissions with the same key are the "same" request
/// from the editor's point of view and the earlier one gets cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub scope: RequestScope,
    pub kind: OperationKind,
}

impl RequestKey {
    pub fn document(document: Uri, kind: OperationKind) -> Self {
        Self {
            scope: RequestScope::Document(document),
            kind,
        }
    }

    pub fn workspace(kind: OperationKind) -> Self {
        Self {
            scope: RequestScope::Workspace,
            kind,
        }
    }
}

/// Per-server results of a drained request, in arrival order.
#[derive(Debug)]
pub struct CollectedResults<R> {
    pub results: Vec<(ServerBinding, R)>,
    pub summary: DrainSummary,
}

/// Front door for hosts. Owns the registry, the coalescer, the staleness
/// tracker and the diagnostics store, and wires them together for each
/// request so callers never touch the plumbing directly.
#[derive(Clone)]
pub struct RequestManager {
    dispatcher: MultiServerDispatcher,
    coalescer: RequestCoalescer<RequestKey>,
    staleness: StalenessTracker,
    diagnostics: DiagnosticsStore,
}

impl RequestManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            dispatcher: MultiServerDispatcher::new(ServerRegistry::new(), config),
            coalescer: RequestCoalescer::new(),
            staleness: StalenessTracker::new(),
            diagnostics: DiagnosticsStore::new(),
        }
    }

    pub fn registry(&self) -> &ServerRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &LifecycleConfig {
        self.dispatcher.config()
    }

    pub fn diagnostics(&self) -> &DiagnosticsStore {
        &self.diagnostics
    }

    pub fn staleness(&self) -> &StalenessTracker {
        &self.staleness
    }

    pub(crate) fn dispatcher(&self) -> &MultiServerDispatcher {
        &self.dispatcher
    }

    pub(crate) fn coalescer(&self) -> &RequestCoalescer<RequestKey> {
        &self.coalescer
    }

    /// Registers a server that has started but not finished initializing.
    /// It stays invisible to dispatch until [`RequestManager::server_initialized`].
    pub async fn server_started(&self, id: ServerId, name: impl Into<String>) {
        self.registry().register_server(id, name).await;
    }

    pub async fn server_initialized(&self, id: &ServerId, capabilities: ServerCapabilities) {
        self.registry().set_capabilities(id, capabilities).await;
    }

    /// Forgets a stopped server and every diagnostic it published. In-flight
    /// requests to it settle as failures or cancellations on their own.
    pub async fn server_stopped(&self, id: &ServerId) {
        self.registry().remove_server(id).await;
        self.diagnostics.clear_server(id).await;
    }

    pub async fn document_opened(&self, document: &Uri, server: ServerId) {
        self.registry().bind(document, server).await;
    }

    /// Marks the document changed. In-flight requests that captured an older
    /// staleness token stop delivering at their next poll tick.
    pub fn document_edited(&self, document: &Uri) {
        self.staleness.bump(document);
    }

    /// Cancels the document's in-flight requests and drops every piece of
    /// per-document state.
    pub async fn document_closed(&self, document: &Uri) {
        for kind in OperationKind::all() {
            self.coalescer
                .cancel(&RequestKey::document(document.clone(), *kind));
        }
        self.coalescer.purge_finished();
        self.staleness.forget(document);
        self.diagnostics.clear_document(document).await;
        self.registry().unbind_all(document).await;
    }

    pub async fn diagnostics_published(&self, server: &ServerId, params: PublishDiagnosticsParams) {
        self.diagnostics.update(server, params).await;
    }

    /// Host-driven cancellation, e.g. the user dismissed the popup the
    /// request was feeding. True if a live request was cancelled.
    pub fn cancel_request(&self, key: &RequestKey) -> bool {
        let cancelled = self.coalescer.cancel(key);
        if cancelled {
            debug!("cancelled {} request on host demand", key.kind);
        }
        cancelled
    }

    /// Runs `request_fn` against every server bound to `document` that
    /// passes `filter`, collecting the raw per-server results in arrival
    /// order. Typed operations like completion sit on top of this with
    /// their own merge.
    ///
    /// The request is single-flight per `(document, kind)`: submitting again
    /// cancels the previous run. Per-server results arriving after the
    /// document changed (or after the request was cancelled) are dropped.
    pub async fn request<R, F, Fut>(
        &self,
        document: &Uri,
        kind: OperationKind,
        filter: CapabilityFilter,
        request_fn: F,
    ) -> Result<CollectedResults<R>>
    where
        R: Send + 'static,
        F: Fn(ServerBinding) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<R, String>> + Send + 'static,
    {
        let key = RequestKey::document(document.clone(), kind);
        let token = self.staleness.token(document);
        let dispatcher = self.dispatcher.clone();
        let staleness = self.staleness.clone();
        let document = document.clone();

        let task = self.coalescer.submit(key, || {
            let outer = CancelHandle::new();
            let handle = outer.clone();
            Ok::<_, LifecycleError>(CancellableTask::spawn_with_handle(outer, async move {
                let dispatch = dispatcher.dispatch(&document, &filter, request_fn).await;
                handle.register_child(dispatch.cancel_handle());
                let mut results = Vec::new();
                let summary = dispatch
                    .drain(
                        handle.token(),
                        || staleness.is_stale(&document, token),
                        |server, payload| results.push((server, payload)),
                    )
                    .await?;
                Ok::<_, LifecycleError>(CollectedResults { results, summary })
            }))
        })?;

        task.join().await.map_err(LifecycleError::from)?
    }
}

impl fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManager")
            .field("live_requests", &self.coalescer.live_requests())
            .finish()
    }
}
