//! Workspace-symbol fan-out across every registered server.
//!
//! Unlike document requests this is not scoped to a binding: any server
//! that advertises a workspace symbol provider is asked. The two response
//! shapes servers may return (flat `SymbolInformation` or nested
//! `WorkspaceSymbol`) are normalized into one hit type.

use crate::capability::CapabilityFilter;
use crate::error::LifecycleError;
use crate::error::Result;
use crate::error::ServerFailure;
use crate::operations::OperationKind;
use crate::operations::RequestKey;
use crate::operations::RequestManager;
use crate::registry::ServerBinding;
use crate::registry::ServerId;
use lsp_types::OneOf;
use lsp_types::Range;
use lsp_types::SymbolKind;
use lsp_types::Uri;
use lsp_types::WorkspaceSymbolResponse;
use quorum_async_utils::CancelHandle;
use quorum_async_utils::CancellableTask;
use std::future::Future;

/// One workspace symbol, normalized from either response shape and tagged
/// with the server that reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSymbolHit {
    pub server: ServerId,
    pub name: String,
    pub kind: SymbolKind,
    pub container_name: Option<String>,
    pub uri: Uri,
    /// Absent when the server only reported the containing document and the
    /// precise range needs a resolve round trip.
    pub range: Option<Range>,
}

/// Symbols from every responding server, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSymbols {
    pub symbols: Vec<WorkspaceSymbolHit>,
    pub failures: Vec<ServerFailure>,
}

impl MergedSymbols {
    fn absorb(&mut self, server: ServerId, response: WorkspaceSymbolResponse) {
        match response {
            WorkspaceSymbolResponse::Flat(symbols) => {
                for symbol in symbols {
                    self.symbols.push(WorkspaceSymbolHit {
                        server: server.clone(),
                        name: symbol.name,
                        kind: symbol.kind,
                        container_name: symbol.container_name,
                        uri: symbol.location.uri,
                        range: Some(symbol.location.range),
                    });
                }
            }
            WorkspaceSymbolResponse::Nested(symbols) => {
                for symbol in symbols {
                    let (uri, range) = match symbol.location {
                        OneOf::Left(location) => (location.uri, Some(location.range)),
                        OneOf::Right(workspace_location) => (workspace_location.uri, None),
                    };
                    self.symbols.push(WorkspaceSymbolHit {
                        server: server.clone(),
                        name: symbol.name,
                        kind: symbol.kind,
                        container_name: symbol.container_name,
                        uri,
                        range,
                    });
                }
            }
        }
    }
}

impl RequestManager {
    /// Workspace-wide symbol search. Single-flight: a new query replaces the
    /// in-flight one, which matches how hosts drive this while the user is
    /// still typing in the symbol picker.
    pub async fn workspace_symbols<F, Fut>(&self, request_fn: F) -> Result<MergedSymbols>
    where
        F: Fn(ServerBinding) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<WorkspaceSymbolResponse, String>> + Send + 'static,
    {
        let key = RequestKey::workspace(OperationKind::WorkspaceSymbols);
        let dispatcher = self.dispatcher().clone();

        let task = self.coalescer().submit(key, || {
            let outer = CancelHandle::new();
            let handle = outer.clone();
            Ok::<_, LifecycleError>(CancellableTask::spawn_with_handle(outer, async move {
                let dispatch = dispatcher
                    .dispatch_all(&CapabilityFilter::workspace_symbols(), request_fn)
                    .await;
                handle.register_child(dispatch.cancel_handle());
                let mut merged = MergedSymbols::default();
                let summary = dispatch
                    .drain(
                        handle.token(),
                        || false,
                        |server, response| merged.absorb(server.id, response),
                    )
                    .await?;
                merged.failures = summary.failures;
                Ok::<_, LifecycleError>(merged)
            }))
        })?;

        task.join().await.map_err(LifecycleError::from)?
    }
}
