//! Per-document staleness tracking.
//!
//! Every edit bumps the document's version counter. A request captures the
//! counter when it starts and re-checks it while consuming results: a token
//! older than the current counter means the results describe a document state
//! that no longer exists, and the request stops instead of delivering them.

use lsp_types::Uri;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Snapshot of a document's version counter at request start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessToken(u64);

/// Monotonic per-document edit counters. Counters only grow; a token value is
/// never observed twice for the same document.
#[derive(Clone, Default)]
pub struct StalenessTracker {
    counters: Arc<Mutex<HashMap<Uri, Arc<AtomicU64>>>>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, document: &Uri) -> Arc<AtomicU64> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(counters.entry(document.clone()).or_default())
    }

    /// Records a new document version and returns its token. Tokens captured
    /// before this call become stale.
    pub fn bump(&self, document: &Uri) -> StalenessToken {
        StalenessToken(self.counter(document).fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Captures the document's current version.
    pub fn token(&self, document: &Uri) -> StalenessToken {
        StalenessToken(self.counter(document).load(Ordering::Acquire))
    }

    /// True once the document has changed since `token` was captured.
    pub fn is_stale(&self, document: &Uri, token: StalenessToken) -> bool {
        self.counter(document).load(Ordering::Acquire) != token.0
    }

    /// Drops the counter for a closed document.
    pub fn forget(&self, document: &Uri) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        counters.remove(document);
    }
}
