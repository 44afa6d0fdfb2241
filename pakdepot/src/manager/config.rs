//! Configuration for the package manager.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the [`PackageManager`](super::PackageManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory packages are installed into when neither the install
    /// options nor the local record name one.
    pub install_dir: PathBuf,

    /// Root directory for per-package staging (downloaded archives and
    /// intermediate extraction output).
    pub staging_dir: PathBuf,

    /// HTTP request timeout for downloads.
    pub timeout: Duration,

    /// Keep downloaded archives in staging after a successful install.
    pub keep_archives: bool,

    /// JSON file the local package records are persisted to.
    pub records_path: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pakdepot");
        Self {
            install_dir: data_dir.join("packages"),
            staging_dir: std::env::temp_dir().join("pakdepot-staging"),
            timeout: Duration::from_secs(300),
            keep_archives: false,
            records_path: data_dir.join("installed.json"),
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with the given install directory. The
    /// record file moves alongside it.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            records_path: install_dir.join("installed.json"),
            install_dir,
            ..Default::default()
        }
    }

    /// Set the staging directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Set the download timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep downloaded archives after successful installs.
    pub fn with_keep_archives(mut self, keep: bool) -> Self {
        self.keep_archives = keep;
        self
    }

    /// Set the local record file location.
    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = path.into();
        self
    }
}
