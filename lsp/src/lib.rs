//! Request and response lifecycle management for editors that run several
//! language servers against the same documents.
//!
//! The pieces compose around one flow: a host submits a request, the
//! [`RequestCoalescer`] cancels the in-flight run with the same key, the
//! [`MultiServerDispatcher`] fans the request out to every capable server as
//! cancellable children of one parent task, and the drain loop streams
//! per-server results back while watching for cancellation and document
//! staleness. [`RequestManager`] wires it all together behind one facade.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod aggregate;
pub mod capability;
pub mod coalesce;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod operations;
pub mod registry;
pub mod staleness;

pub use aggregate::DrainSummary;
pub use capability::CapabilityFilter;
pub use coalesce::RequestCoalescer;
pub use config::LifecycleConfig;
pub use diagnostics::DiagnosticsStore;
pub use diagnostics::ServerDiagnostics;
pub use dispatch::DispatchHandle;
pub use dispatch::DispatchSummary;
pub use dispatch::MultiServerDispatcher;
pub use dispatch::PartialResult;
pub use error::LifecycleError;
pub use error::Result;
pub use error::ServerFailure;
pub use operations::CollectedResults;
pub use operations::OperationKind;
pub use operations::RequestKey;
pub use operations::RequestManager;
pub use operations::RequestScope;
pub use operations::completion::MergedCompletions;
pub use operations::completion::SourcedCompletionItem;
pub use operations::symbols::MergedSymbols;
pub use operations::symbols::WorkspaceSymbolHit;
pub use registry::ServerBinding;
pub use registry::ServerId;
pub use registry::ServerRegistry;
pub use staleness::StalenessToken;
pub use staleness::StalenessTracker;
