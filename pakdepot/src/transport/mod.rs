//! Download transport boundary.
//!
//! The [`DownloadTransport`] trait is the seam between the install task
//! and the network: the task hands it an asset location and a staging
//! destination, receives a stream of `(bytes_received, total_bytes)`
//! progress events through the sink, and gets back a terminal
//! success/failure result. Implementations own their failure domain and
//! report it as [`TransportError`]; nothing crosses this boundary as an
//! unhandled fault.
//!
//! The trait uses `Pin<Box<dyn Future>>` so it stays dyn-compatible and
//! tasks can hold `Arc<dyn DownloadTransport>`.

mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A single asset transfer: where to fetch from and where to stage it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Asset URL.
    pub url: String,
    /// Destination path in the task's staging directory.
    pub destination: PathBuf,
    /// Expected size in bytes, when the asset metadata specifies one.
    pub expected_size: Option<u64>,
    /// Expected SHA-256 checksum, when the asset metadata specifies one.
    pub checksum: Option<String>,
}

/// Terminal result of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// Total bytes received.
    pub bytes_received: u64,
}

/// Byte-level progress sink: `(bytes_received, total_bytes)`.
///
/// `total_bytes` is zero when the server does not advertise a length.
pub type TransferProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Errors from the transfer failure domain.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection broke mid-stream.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP status {status}")]
    Status { url: String, status: u16 },

    /// Writing the staged file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The received byte count does not match the asset metadata.
    #[error("size mismatch for {url}: expected {expected} bytes, received {received}")]
    SizeMismatch {
        url: String,
        expected: u64,
        received: u64,
    },

    /// The staged file's digest does not match the asset metadata.
    #[error("checksum mismatch for {file_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    /// The cancellation token fired; the transfer was aborted.
    #[error("transfer cancelled")]
    Cancelled,
}

/// Future type returned by [`DownloadTransport::fetch`].
pub type TransferFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransferSummary, TransportError>> + Send + 'a>>;

/// Asynchronous download transport.
///
/// Implementations must observe the cancellation token promptly: once it
/// fires, the transfer is aborted, no further progress is reported, and
/// the future resolves to [`TransportError::Cancelled`].
pub trait DownloadTransport: Send + Sync {
    /// Transfer the asset described by `request` to its destination,
    /// reporting byte progress through `progress`.
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress,
        cancel: CancellationToken,
    ) -> TransferFuture<'a>;
}
