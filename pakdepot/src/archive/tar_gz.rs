//! In-process tar.gz extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tar::Archive;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ArchiveExtractor, ExtractError, ExtractProgress};

/// Extractor for gzip-compressed tar archives.
///
/// Progress is derived from compressed bytes consumed against the archive
/// file size, which stays monotonic over a single pass. The cancellation
/// token is checked between entries.
#[derive(Debug, Default)]
pub struct TarGzExtractor;

impl TarGzExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

/// Reader wrapper that counts bytes consumed from the underlying source.
struct CountingReader<R> {
    inner: R,
    consumed: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl ArchiveExtractor for TarGzExtractor {
    fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: ExtractProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let file = File::open(archive).map_err(|e| ExtractError::Open {
            path: archive.to_path_buf(),
            source: e,
        })?;
        let archive_size = file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| ExtractError::Open {
                path: archive.to_path_buf(),
                source: e,
            })?;

        fs::create_dir_all(dest_dir).map_err(|e| ExtractError::CreateDir {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        let consumed = Arc::new(AtomicU64::new(0));
        let reader = CountingReader {
            inner: BufReader::new(file),
            consumed: Arc::clone(&consumed),
        };
        let mut tar = Archive::new(GzDecoder::new(reader));

        let entries = tar.entries().map_err(|e| ExtractError::Corrupt {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let mut entry = entry.map_err(|e| ExtractError::Corrupt {
                path: archive.to_path_buf(),
                reason: e.to_string(),
            })?;

            let entry_path = entry
                .path()
                .map_err(|e| ExtractError::Corrupt {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                })?
                .into_owned();
            let is_file = entry.header().entry_type().is_file();

            let unpacked = entry
                .unpack_in(dest_dir)
                .map_err(|e| ExtractError::Unpack {
                    path: archive.to_path_buf(),
                    entry: entry_path.display().to_string(),
                    source: e,
                })?;

            // unpack_in refuses entries that would escape dest_dir.
            if unpacked && is_file {
                files.push(entry_path);
            }

            if archive_size > 0 {
                let consumed = consumed.load(Ordering::Relaxed);
                let percent = (consumed.saturating_mul(100) / archive_size).min(100) as u8;
                progress(percent);
            }
        }

        progress(100);
        debug!(
            archive = %archive.display(),
            files = files.len(),
            "extraction complete"
        );

        Ok(files)
    }
}
