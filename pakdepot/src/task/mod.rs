//! The install task core.
//!
//! An [`InstallTask`] drives one package through the
//! download -> extract -> finalize pipeline, reporting progress and firing
//! a single completion event. The submodules hold the pieces:
//!
//! - [`state`]: the closed lifecycle state machine
//! - [`progress`]: the monotonic 0-100 progress tracker
//! - [`download`]: the download phase adapter (byte -> percent mapping)
//! - [`events`]: typed events and the subscription registry
//! - [`driver`]: the orchestrating task itself
//!
//! Concurrency model: `start()`, `cancel()` and all queries are
//! non-blocking; the download phase runs on the tokio event loop, the
//! extract/finalize phases on the blocking worker pool. Cancellation is
//! cooperative through a `CancellationToken` checked at phase
//! checkpoints.

mod download;
mod driver;
mod error;
mod events;
mod options;
mod progress;
mod state;

pub use driver::{InstallContext, InstallTask};
pub use error::InstallError;
pub use events::{
    CompletionEvent, CompletionHandler, InstallOutcome, ProgressEvent, ProgressHandler,
    StateChange, StateChangeHandler,
};
pub use options::InstallOptions;
pub use progress::ProgressTracker;
pub use state::InstallState;
