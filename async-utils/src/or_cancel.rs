//! Racing a future against a cancellation token.

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// The token fired before the future produced its value.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelErr {
    Cancelled,
}

/// Extension that races any future against a [`CancellationToken`].
///
/// The future is dropped at whatever await point it had reached when the
/// token fired, so side effects before that point have already happened.
/// [`crate::CancellableTask`] wraps every spawned task body in this race.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            _ = token.cancelled() => Err(CancelErr::Cancelled),
            res = self => Ok(res),
        }
    }
}
