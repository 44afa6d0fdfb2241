//! Archive extraction boundary.
//!
//! The [`ArchiveExtractor`] trait is the seam between the install task's
//! worker phase and the concrete archive format. Extraction is blocking
//! work; the task runs it on a worker context via `spawn_blocking`.
//! Implementations poll the cancellation token at their checkpoints
//! (between entries) and return [`ExtractError::Cancelled`] when it fires;
//! they are not required to interrupt an entry mid-write.

mod tar_gz;

pub use tar_gz::TarGzExtractor;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Per-entry progress sink, called with a [0, 100] percentage.
pub type ExtractProgress<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Errors from the extraction failure domain.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The staged archive could not be opened.
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive is corrupt or an entry could not be read.
    #[error("failed to read archive {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Writing an extracted entry to the intermediate directory failed.
    #[error("failed to unpack {entry} from {path}: {source}")]
    Unpack {
        path: PathBuf,
        entry: String,
        #[source]
        source: io::Error,
    },

    /// The intermediate directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cancellation token fired at a checkpoint.
    #[error("extraction cancelled")]
    Cancelled,
}

/// Blocking archive extractor.
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack `archive` into `dest_dir`, reporting coarse progress and
    /// checking `cancel` between entries.
    ///
    /// Returns the relative paths of the extracted files, for the local
    /// package manifest.
    fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: ExtractProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}
