//! Install task error kinds.

use thiserror::Error;

/// Errors an install task can terminate with.
///
/// One variant per failure domain. `Validation` is returned synchronously
/// from `start()` and the task never leaves `None`; the other kinds are
/// captured at their phase boundary, stored on the task, and delivered in
/// the completion event. User cancellation is not an error and has no
/// variant here; it is a distinct terminal outcome.
///
/// The richer adapter errors ([`TransportError`](crate::transport::TransportError),
/// [`ExtractError`](crate::archive::ExtractError)) convert into these
/// compact, clonable kinds when they cross the phase boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    /// Unresolvable version/SDK selection or malformed options.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport failure, non-success status, or checksum/size mismatch.
    #[error("download failed: {0}")]
    Download(String),

    /// Corrupt or unreadable archive, or I/O failure while unpacking.
    #[error("extraction failed: {0}")]
    Extract(String),

    /// Destination conflict or I/O failure during the final move.
    #[error("finalization failed: {0}")]
    Finalize(String),
}
