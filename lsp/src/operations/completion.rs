//! Completion fan-out and merge.
//!
//! Every server bound to the document that advertises a completion provider
//! is asked, and the per-server responses are folded into one list as they
//! arrive. Items remember which server produced them so the host can route
//! resolve requests back to the right one.

use crate::capability::CapabilityFilter;
use crate::error::LifecycleError;
use crate::error::Result;
use crate::error::ServerFailure;
use crate::operations::OperationKind;
use crate::operations::RequestKey;
use crate::operations::RequestManager;
use crate::registry::ServerBinding;
use crate::registry::ServerId;
use lsp_types::CompletionItem;
use lsp_types::CompletionResponse;
use lsp_types::Uri;
use quorum_async_utils::CancelHandle;
use quorum_async_utils::CancellableTask;
use std::future::Future;

/// A completion item tagged with the server that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedCompletionItem {
    pub server: ServerId,
    pub item: CompletionItem,
}

/// The union of every server's completions, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedCompletions {
    pub items: Vec<SourcedCompletionItem>,
    /// True when any contributing server returned an incomplete list, in
    /// which case the host should re-query on further typing.
    pub is_incomplete: bool,
    /// Servers that were asked but failed. Empty on a clean merge.
    pub failures: Vec<ServerFailure>,
}

impl MergedCompletions {
    fn absorb(&mut self, server: ServerId, response: CompletionResponse) {
        match response {
            CompletionResponse::Array(items) => self.extend_items(server, items),
            CompletionResponse::List(list) => {
                self.is_incomplete |= list.is_incomplete;
                self.extend_items(server, list.items);
            }
        }
    }

    fn extend_items(&mut self, server: ServerId, items: Vec<CompletionItem>) {
        self.items.extend(items.into_iter().map(|item| SourcedCompletionItem {
            server: server.clone(),
            item,
        }));
    }
}

impl RequestManager {
    /// Completion on `document`. Single-flight per document: a new call
    /// cancels the previous one, as does an edit arriving mid-merge.
    pub async fn completion<F, Fut>(
        &self,
        document: &Uri,
        request_fn: F,
    ) -> Result<MergedCompletions>
    where
        F: Fn(ServerBinding) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<CompletionResponse, String>> + Send + 'static,
    {
        let key = RequestKey::document(document.clone(), OperationKind::Completion);
        let token = self.staleness().token(document);
        let dispatcher = self.dispatcher().clone();
        let staleness = self.staleness().clone();
        let document = document.clone();

        let task = self.coalescer().submit(key, || {
            let outer = CancelHandle::new();
            let handle = outer.clone();
            Ok::<_, LifecycleError>(CancellableTask::spawn_with_handle(outer, async move {
                let dispatch = dispatcher
                    .dispatch(&document, &CapabilityFilter::completion(), request_fn)
                    .await;
                handle.register_child(dispatch.cancel_handle());
                let mut merged = MergedCompletions::default();
                let summary = dispatch
                    .drain(
                        handle.token(),
                        || staleness.is_stale(&document, token),
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
