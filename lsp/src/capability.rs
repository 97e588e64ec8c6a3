//! Capability-based server selection.

use crate::registry::ServerBinding;
use lsp_types::OneOf;
use lsp_types::ServerCapabilities;
use std::sync::Arc;

fn provider_enabled<T>(provider: Option<&OneOf<bool, T>>) -> bool {
    match provider {
        Some(OneOf::Left(enabled)) => *enabled,
        Some(OneOf::Right(_)) => true,
        None => false,
    }
}

/// Decides which servers take part in a dispatch, based solely on the
/// capability snapshot each server advertised at initialize time.
///
/// Servers that have not finished initializing advertise no capabilities and
/// are rejected outright; a dispatch never waits for them.
#[derive(Clone)]
pub struct CapabilityFilter {
    label: &'static str,
    predicate: Arc<dyn Fn(&ServerCapabilities) -> bool + Send + Sync>,
}

impl CapabilityFilter {
    pub fn new(
        label: &'static str,
        predicate: impl Fn(&ServerCapabilities) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            predicate: Arc::new(predicate),
        }
    }

    /// Accepts every initialized server.
    pub fn any() -> Self {
        Self::new("any", |_| true)
    }

    pub fn completion() -> Self {
        Self::new("completion", |caps| caps.completion_provider.is_some())
    }

    pub fn hover() -> Self {
        Self::new("hover", |caps| match caps.hover_provider.as_ref() {
            Some(lsp_types::HoverProviderCapability::Simple(enabled)) => *enabled,
            Some(lsp_types::HoverProviderCapability::Options(_)) => true,
            None => false,
        })
    }

    pub fn definition() -> Self {
        Self::new("definition", |caps| {
            provider_enabled(caps.definition_provider.as_ref())
        })
    }

    pub fn workspace_symbols() -> Self {
        Self::new("workspace-symbols", |caps| {
            provider_enabled(caps.workspace_symbol_provider.as_ref())
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Pure check against an advertised capability set.
    pub fn matches(&self, capabilities: &ServerCapabilities) -> bool {
        (self.predicate)(capabilities)
    }

    /// Binding-level check: initializing servers are rejected without running
    /// the predicate.
    pub fn accepts(&self, binding: &ServerBinding) -> bool {
        match binding.capabilities.as_ref() {
            Some(capabilities) => self.matches(capabilities),
            None => false,
        }
    }
}

impl std::fmt::Debug for CapabilityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityFilter")
            .field("label", &self.label)
            .finish()
    }
}
