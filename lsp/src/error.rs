//! Lifecycle error types

use crate::registry::ServerId;
use quorum_async_utils::TaskError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Failure of a single server's request, isolated from its siblings.
///
/// One server failing never aborts the others: the failure travels through
/// the result queue as data and is reported alongside whatever the healthy
/// servers produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub server: ServerId,
    pub message: String,
}

impl std::fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.server, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The request was cancelled before it finished. Not a fault.
    #[error("request was cancelled")]
    Cancelled,

    /// A newer request for the same key replaced this one. Not a fault.
    #[error("request was superseded by a newer one")]
    Superseded,

    /// Every dispatched server failed. Carries one cause per server.
    #[error("all {} dispatched servers failed", .0.len())]
    AllServersFailed(Vec<ServerFailure>),

    /// A lifecycle task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl LifecycleError {
    /// Cancellation-class terminations are expected control flow. Callers
    /// drop them silently instead of surfacing them as failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Superseded)
    }
}

impl From<TaskError> for LifecycleError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Cancelled => Self::Cancelled,
            TaskError::Failed(message) => Self::TaskPanicked(message),
        }
    }
}
