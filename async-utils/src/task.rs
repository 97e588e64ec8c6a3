use crate::or_cancel::CancelErr;
use crate::or_cancel::OrCancelExt;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

/// Terminal outcome of a [`CancellableTask`] that did not produce a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Failed(String),
}

#[derive(Default)]
struct HandleState {
    token: CancellationToken,
    children: Mutex<Vec<CancelHandle>>,
    finished: AtomicBool,
}

/// Cascading cancellation handle.
///
/// Cancelling a handle fires its token and every child registered under it.
/// Cancellation is monotonic: a cancelled handle never reverts, and repeated
/// cancels are no-ops. Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct CancelHandle {
    state: Arc<HandleState>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a new handle that is cancelled whenever `self` is cancelled.
    pub fn child(&self) -> Self {
        let child = Self {
            state: Arc::new(HandleState {
                token: self.state.token.child_token(),
                children: Mutex::new(Vec::new()),
                finished: AtomicBool::new(false),
            }),
        };
        self.register_child(&child);
        child
    }

    /// Registers an independently created handle so that cancelling `self`
    /// cancels it too. If `self` is already cancelled, or becomes cancelled
    /// concurrently with the registration, the child is cancelled before this
    /// returns.
    pub fn register_child(&self, child: &CancelHandle) {
        {
            let mut children = self
                .state
                .children
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            children.push(child.clone());
        }
        // Re-check after publishing: a concurrent cancel may have drained the
        // list before our push landed.
        if self.is_cancelled() {
            child.cancel();
        }
    }

    /// Fires the token and cancels all registered children. Idempotent.
    pub fn cancel(&self) {
        self.state.token.cancel();
        let children = {
            let mut children = self
                .state
                .children
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *children)
        };
        for child in children {
            child.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.token.is_cancelled()
    }

    /// True once the associated task has resolved (with a value, a failure,
    /// or by observing cancellation).
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.state.token
    }

    fn mark_finished(&self) {
        self.state.finished.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// A spawned computation paired with a [`CancelHandle`].
///
/// The future races the handle's token: when the handle is cancelled the task
/// stops at its next await point and [`CancellableTask::join`] resolves to
/// [`TaskError::Cancelled`]. The task resolves exactly once; cancelling after
/// resolution does not change the outcome. Dropping the task without joining
/// aborts the underlying tokio task.
#[derive(Debug)]
pub struct CancellableTask<T> {
    handle: CancelHandle,
    join: AbortOnDropHandle<Result<T, CancelErr>>,
}

impl<T> CancellableTask<T>
where
    T: Send + 'static,
{
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::spawn_with_handle(CancelHandle::new(), future)
    }

    /// Spawns `future` under an existing handle. The caller keeps ownership
    /// of the handle; cancelling any clone of it cancels the task.
    pub fn spawn_with_handle<F>(handle: CancelHandle, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let task_handle = handle.clone();
        let join = AbortOnDropHandle::new(tokio::spawn(async move {
            let res = future.or_cancel(task_handle.token()).await;
            task_handle.mark_finished();
            res
        }));
        Self { handle, join }
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn handle(&self) -> &CancelHandle {
        &self.handle
    }

    /// Waits for the task to resolve. A panic inside the task surfaces as
    /// [`TaskError::Failed`] carrying the panic message.
    pub async fn join(self) -> Result<T, TaskError> {
        match self.join.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CancelErr::Cancelled)) => Err(TaskError::Cancelled),
            Err(err) if err.is_cancelled() => Err(TaskError::Cancelled),
            Err(err) => Err(TaskError::Failed(err.to_string())),
        }
    }
}
