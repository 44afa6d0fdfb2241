//! Local package records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::{Asset, Package};

/// Installation status of a local package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    /// No installation has been attempted yet.
    NotInstalled,
    /// An install task is currently driving this package.
    Installing,
    /// The package is installed and usable.
    Installed,
    /// The last installation attempt failed or was cancelled.
    Failed,
}

impl PackageStatus {
    /// Human-readable status name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotInstalled => "Not Installed",
            Self::Installing => "Installing",
            Self::Installed => "Installed",
            Self::Failed => "Failed",
        }
    }
}

/// List of files a package placed on disk, relative to its install
/// directory. Recorded during extraction and used for uninstall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    files: Vec<PathBuf>,
}

impl Manifest {
    /// Record an extracted file. Paths are relative.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// The recorded files.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// True when no files are recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop all recorded files (before a fresh extraction).
    pub fn clear(&mut self) {
        self.files.clear();
    }
}

/// A package as installed, or being installed, on this machine.
///
/// Local records are owned by the [`PackageManager`](crate::manager::PackageManager)
/// and mutated by the install task that is driving them; the manager
/// guarantees the record outlives any task referencing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalPackage {
    /// Package identity.
    #[serde(flatten)]
    pub package: Package,

    /// Current installation status.
    pub status: PackageStatus,

    /// Directory the package is (or will be) installed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// The asset that was installed, once installation succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_asset: Option<Asset>,

    /// When the package was last successfully installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,

    /// Errors from failed installation attempts, newest last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    /// Files the package placed on disk.
    #[serde(default)]
    pub manifest: Manifest,
}

impl LocalPackage {
    /// Create a fresh local record for a package that is not installed.
    pub fn new(package: Package) -> Self {
        Self {
            package,
            status: PackageStatus::NotInstalled,
            install_dir: None,
            installed_asset: None,
            installed_at: None,
            errors: Vec::new(),
            manifest: Manifest::default(),
        }
    }

    /// Package identifier.
    pub fn id(&self) -> &str {
        &self.package.id
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// A local record is valid when its identity is valid.
    pub fn valid(&self) -> bool {
        self.package.valid()
    }

    /// True once the package is fully installed.
    pub fn is_installed(&self) -> bool {
        self.status == PackageStatus::Installed
    }

    /// Version of the installed asset, if any.
    pub fn version(&self) -> Option<&Version> {
        self.installed_asset.as_ref().map(|a| &a.version)
    }

    /// Set the directory this package installs into.
    pub fn set_install_dir(&mut self, dir: impl Into<PathBuf>) {
        self.install_dir = Some(dir.into());
    }

    /// The directory this package installs into, if resolved.
    pub fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }

    /// Mark the package installed with the given asset.
    pub fn set_installed(&mut self, asset: Asset) {
        self.installed_asset = Some(asset);
        self.installed_at = Some(Utc::now());
        self.status = PackageStatus::Installed;
    }

    /// Record an installation error.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Clear recorded errors (after a successful installation).
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// The most recent installation error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }
}
