//! Install task options.

use std::path::PathBuf;

/// Immutable configuration captured when an install task is created.
///
/// Version selection at `start()` follows this precedence: an exact
/// `version` pin wins, then the newest asset for `sdk_version`, then the
/// package's latest asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Install this exact package version.
    pub version: Option<String>,

    /// Install the latest version built for this SDK/platform version.
    pub sdk_version: Option<String>,

    /// Install into this directory instead of the manager default.
    pub install_dir: Option<PathBuf>,
}

impl InstallOptions {
    /// Create empty options: latest version, manager-default directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an exact package version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Select the latest version for the given SDK version.
    pub fn with_sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
        self.sdk_version = Some(sdk_version.into());
        self
    }

    /// Override the installation directory.
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }
}
