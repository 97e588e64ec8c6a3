//! Per-server diagnostics storage.
//!
//! Every server publishes diagnostics for a document independently. The
//! store keeps each server's set separate, so one server refreshing its
//! findings never clobbers another's, and merges on demand for display.

use crate::registry::ServerId;
use lsp_types::Diagnostic;
use lsp_types::DiagnosticSeverity;
use lsp_types::PublishDiagnosticsParams;
use lsp_types::Uri;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::info;

/// One server's current diagnostics for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDiagnostics {
    pub server: ServerId,
    pub diagnostics: Vec<Diagnostic>,
    pub version: Option<i32>,
}

#[derive(Default)]
struct DocumentDiagnostics {
    /// One entry per publishing server, in first-publish order; merges
    /// preserve it.
    per_server: Vec<ServerDiagnostics>,
}

fn severity_count(diagnostics: &[Diagnostic], severity: DiagnosticSeverity) -> usize {
    diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == Some(severity))
        .count()
}

/// Diagnostics published by all servers, keyed by (document, server).
#[derive(Clone, Default)]
pub struct DiagnosticsStore {
    documents: Arc<RwLock<HashMap<Uri, DocumentDiagnostics>>>,
}

impl std::fmt::Debug for DiagnosticsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsStore").finish_non_exhaustive()
    }
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a publishDiagnostics notification from `server`, replacing
    /// that server's previous set for the document. Other servers' sets are
    /// untouched.
    pub async fn update(&self, server: &ServerId, params: PublishDiagnosticsParams) {
        let errors = severity_count(&params.diagnostics, DiagnosticSeverity::ERROR);
        let warnings = severity_count(&params.diagnostics, DiagnosticSeverity::WARNING);
        info!(
            "received {} diagnostics for {} from {server} ({errors} errors, {warnings} warnings)",
            params.diagnostics.len(),
            params.uri.as_str(),
        );

        let mut documents = self.documents.write().await;
        let document = documents.entry(params.uri).or_default();
        let entry = ServerDiagnostics {
            server: server.clone(),
            diagnostics: params.diagnostics,
            version: params.version,
        };
        match document
            .per_server
            .iter_mut()
            .find(|existing| existing.server == *server)
        {
            Some(existing) => *existing = entry,
            None => document.per_server.push(entry),
        }
    }

    /// Per-server diagnostic groups for `document`, in first-publish order.
    pub async fn document(&self, document: &Uri) -> Vec<ServerDiagnostics> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(|entry| entry.per_server.clone())
            .unwrap_or_default()
    }

    /// All diagnostics for `document`, flattened across servers.
    pub async fn merged(&self, document: &Uri) -> Vec<Diagnostic> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(|entry| {
                entry
                    .per_server
                    .iter()
                    .flat_map(|server| server.diagnostics.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops everything a stopped server ever published.
    pub async fn clear_server(&self, server: &ServerId) {
        let mut documents = self.documents.write().await;
        for entry in documents.values_mut() {
            entry.per_server.retain(|existing| existing.server != *server);
        }
        documents.retain(|_, entry| !entry.per_server.is_empty());
        debug!("cleared diagnostics published by {server}");
    }

    pub async fn clear_document(&self, document: &Uri) {
        let mut documents = self.documents.write().await;
        documents.remove(document);
    }

    pub async fn clear(&self) {
        let mut documents = self.documents.write().await;
        documents.clear();
    }
}
