//! Cancellation primitives shared across the quorum crates.
//!
//! [`CancelHandle`] is a cascading cancellation handle: cancelling it cancels
//! every child registered under it, transitively. [`CancellableTask`] pairs a
//! spawned future with a handle so the computation stops at its next await
//! point once the handle fires. [`OrCancelExt`] is the underlying racing
//! primitive for futures that are not spawned.

mod or_cancel;
mod task;

pub use or_cancel::CancelErr;
pub use or_cancel::OrCancelExt;
pub use task::CancelHandle;
pub use task::CancellableTask;
pub use task::TaskError;
