//! Server sessions and their document bindings.
//!
//! The registry is the host-facing side of the lifecycle manager: the host
//! reports server starts, initialize results, document open/close, and server
//! shutdowns. Dispatch reads consistent snapshots out of it and never holds
//! the lock across a request.

use lsp_types::ServerCapabilities;
use lsp_types::Uri;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::info;

/// Identifier of one running language server session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ServerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Read-only snapshot of one server as seen at dispatch time.
///
/// `capabilities` is `None` until the server's initialize response arrives;
/// such bindings are skipped by dispatch and never awaited. A snapshot
/// captured for a dispatch stays fixed for that dispatch even if the server
/// re-initializes concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerBinding {
    pub id: ServerId,
    pub name: String,
    pub capabilities: Option<ServerCapabilities>,
}

impl ServerBinding {
    pub fn is_initializing(&self) -> bool {
        self.capabilities.is_none()
    }
}

#[derive(Default)]
struct RegistryState {
    /// Registration order; snapshots preserve it.
    servers: Vec<ServerBinding>,
    /// Per-document server ids, in bind order.
    bindings: HashMap<Uri, Vec<ServerId>>,
}

impl RegistryState {
    fn server_mut(&mut self, id: &ServerId) -> Option<&mut ServerBinding> {
        self.servers.iter_mut().find(|server| server.id == *id)
    }
}

/// Tracks running servers, their capability snapshots, and which documents
/// they serve. Cloning shares the same underlying table.
#[derive(Clone, Default)]
pub struct ServerRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly started server. It stays in the initializing state
    /// (no capabilities) until [`ServerRegistry::set_capabilities`] is called.
    pub async fn register_server(&self, id: ServerId, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.write().await;
        if state.server_mut(&id).is_some() {
            debug!("server {id} already registered");
            return;
        }
        info!("registered server {id} ({name})");
        state.servers.push(ServerBinding {
            id,
            name,
            capabilities: None,
        });
    }

    /// Applies the capability set from a server's initialize response. This
    /// is the only way a binding's capabilities change; dispatches that
    /// already snapshotted the old set keep it.
    pub async fn set_capabilities(&self, id: &ServerId, capabilities: ServerCapabilities) {
        let mut state = self.state.write().await;
        match state.server_mut(id) {
            Some(server) => {
                debug!("capabilities updated for server {id}");
                server.capabilities = Some(capabilities);
            }
            None => debug!("capability update for unknown server {id}"),
        }
    }

    /// Drops a server and all of its document bindings.
    pub async fn remove_server(&self, id: &ServerId) {
        let mut state = self.state.write().await;
        state.servers.retain(|server| server.id != *id);
        for servers in state.bindings.values_mut() {
            servers.retain(|bound| bound != id);
        }
        info!("removed server {id}");
    }

    /// Associates a document with a server. Bind order is preserved in
    /// [`ServerRegistry::bound_servers`] snapshots.
    pub async fn bind(&self, document: &Uri, id: ServerId) {
        let mut state = self.state.write().await;
        let servers = state.bindings.entry(document.clone()).or_default();
        if !servers.contains(&id) {
            debug!("bound {} to server {id}", document.as_str());
            servers.push(id);
        }
    }

    pub async fn unbind(&self, document: &Uri, id: &ServerId) {
        let mut state = self.state.write().await;
        if let Some(servers) = state.bindings.get_mut(document) {
            servers.retain(|bound| bound != id);
            if servers.is_empty() {
                state.bindings.remove(document);
            }
        }
    }

    /// Drops every binding of a closed document. The servers themselves stay
    /// registered.
    pub async fn unbind_all(&self, document: &Uri) {
        let mut state = self.state.write().await;
        state.bindings.remove(document);
    }

    /// Snapshot of the servers bound to `document`, in bind order. Ids whose
    /// server has been removed are silently dropped.
    pub async fn bound_servers(&self, document: &Uri) -> Vec<ServerBinding> {
        let state = self.state.read().await;
        let Some(ids) = state.bindings.get(document) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                state
                    .servers
                    .iter()
                    .find(|server| server.id == *id)
                    .cloned()
            })
            .collect()
    }

    /// Snapshot of every registered server, in registration order. Used by
    /// workspace-scoped operations that are not tied to one document.
    pub async fn all_servers(&self) -> Vec<ServerBinding> {
        self.state.read().await.servers.clone()
    }

    pub async fn server(&self, id: &ServerId) -> Option<ServerBinding> {
        let state = self.state.read().await;
        state.servers.iter().find(|server| server.id == *id).cloned()
    }
}
