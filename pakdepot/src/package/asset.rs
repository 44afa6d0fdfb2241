//! Downloadable asset descriptor.

use semver::Version;
use serde::{Deserialize, Serialize};

/// A concrete downloadable artifact for one package version.
///
/// Assets are owned by the [`RemotePackage`](super::RemotePackage) they
/// belong to; install tasks read them but never mutate them. The expected
/// size and checksum are optional hints the transport verifies when
/// present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Archive file name (e.g. "demo-1.2.0.tar.gz").
    pub file_name: String,

    /// Version of the package this asset provides.
    pub version: Version,

    /// SDK/platform version this asset was built against, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,

    /// Download URL.
    pub url: String,

    /// Expected archive size in bytes, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    /// Expected SHA-256 checksum (lowercase hex), when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Asset {
    /// Create a minimal asset with a file name, version and URL.
    pub fn new(file_name: impl Into<String>, version: Version, url: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            version,
            sdk_version: None,
            url: url.into(),
            file_size: None,
            checksum: None,
        }
    }

    /// Set the SDK version this asset targets.
    pub fn with_sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
        self.sdk_version = Some(sdk_version.into());
        self
    }

    /// Set the expected archive size.
    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Set the expected SHA-256 checksum.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// An asset is valid when it names a file and a download location.
    pub fn valid(&self) -> bool {
        !self.file_name.is_empty() && !self.url.is_empty()
    }
}
