//! HTTP download transport.
//!
//! Streams the asset to the staging destination with async `reqwest`,
//! reporting byte progress per chunk and observing the cancellation token
//! between chunks. When the asset metadata carries a SHA-256 checksum,
//! chunks feed a digest as they arrive, so verification never re-reads
//! the staged file.

use std::fs;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    DownloadTransport, TransferFuture, TransferProgress, TransferRequest, TransferSummary,
    TransportError,
};

/// Default timeout for HTTP requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP-based download transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }

    async fn fetch_inner(
        &self,
        request: &TransferRequest,
        progress: TransferProgress,
        cancel: CancellationToken,
    ) -> Result<TransferSummary, TransportError> {
        let url = &request.url;

        let response = tokio::select! {
            response = self.client.get(url).send() => {
                response.map_err(|e| TransportError::Request {
                    url: url.clone(),
                    source: e,
                })?
            }
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        // Prefer the advertised length; fall back to the asset metadata.
        let total_bytes = response
            .content_length()
            .or(request.expected_size)
            .unwrap_or(0);

        debug!(url, total_bytes, dest = %request.destination.display(), "starting transfer");

        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::Write {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        let mut file = tokio::fs::File::create(&request.destination)
            .await
            .map_err(|e| TransportError::Write {
                path: request.destination.clone(),
                source: e,
            })?;

        let mut stream = response.bytes_stream();
        let mut bytes_received = 0u64;
        let mut hasher = request.checksum.as_ref().map(|_| Sha256::new());

        loop {
            let chunk: Option<Bytes> = tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(chunk) => Some(chunk.map_err(|e| TransportError::Request {
                        url: url.clone(),
                        source: e,
                    })?),
                    None => None,
                },
                _ = cancel.cancelled() => {
                    drop(file);
                    fs::remove_file(&request.destination).ok();
                    return Err(TransportError::Cancelled);
                }
            };

            let Some(chunk) = chunk else { break };

            file.write_all(&chunk)
                .await
                .map_err(|e| TransportError::Write {
                    path: request.destination.clone(),
                    source: e,
                })?;

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            bytes_received += chunk.len() as u64;
            progress(bytes_received, total_bytes);
        }

        file.flush().await.map_err(|e| TransportError::Write {
            path: request.destination.clone(),
            source: e,
        })?;
        drop(file);

        if let Some(expected) = request.expected_size {
            if bytes_received != expected {
                return Err(TransportError::SizeMismatch {
                    url: url.clone(),
                    expected,
                    received: bytes_received,
                });
            }
        }

        if let (Some(expected), Some(hasher)) = (request.checksum.as_deref(), hasher) {
            check_digest(request, expected, hasher)?;
        }

        debug!(url, bytes_received, "transfer complete");

        Ok(TransferSummary { bytes_received })
    }
}

/// Compare the streamed digest against the expected lowercase hex value.
fn check_digest(
    request: &TransferRequest,
    expected: &str,
    hasher: Sha256,
) -> Result<(), TransportError> {
    let actual = format!("{:x}", hasher.finalize());
    if actual == expected {
        return Ok(());
    }
    // Leave no corrupt archive behind for a retry to trip over.
    fs::remove_file(&request.destination).ok();
    Err(TransportError::ChecksumMismatch {
        file_name: request
            .destination
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
        expected: expected.to_string(),
        actual,
    })
}

impl DownloadTransport for HttpTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(self.fetch_inner(request, progress, cancel))
    }
}
