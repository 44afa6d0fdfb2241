//! Remote package records and asset selection.

use semver::Version;
use serde::{Deserialize, Serialize};

use super::{Asset, Package};

/// A package as published in a remote catalog.
///
/// Carries the package identity plus the list of downloadable assets, one
/// per published version (and per SDK build where applicable). Remote
/// records are immutable once loaded; install tasks hold shared read-only
/// references to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePackage {
    /// Package identity.
    #[serde(flatten)]
    pub package: Package,

    /// Published assets, not necessarily ordered by version.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl RemotePackage {
    /// Create a remote package with no assets.
    pub fn new(package: Package) -> Self {
        Self {
            package,
            assets: Vec::new(),
        }
    }

    /// Add an asset to the package.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Package identifier.
    pub fn id(&self) -> &str {
        &self.package.id
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// A remote record is valid when its identity is valid and it has at
    /// least one asset.
    pub fn valid(&self) -> bool {
        self.package.valid() && !self.assets.is_empty()
    }

    /// The asset with the highest version, if any assets exist.
    pub fn latest_asset(&self) -> Option<&Asset> {
        self.assets.iter().max_by(|a, b| a.version.cmp(&b.version))
    }

    /// The asset matching the given version exactly.
    pub fn asset_version(&self, version: &Version) -> Option<&Asset> {
        self.assets.iter().find(|a| &a.version == version)
    }

    /// The highest-versioned asset built against the given SDK version.
    ///
    /// Assets without an `sdk_version` never match; this is the safe
    /// selection path for plug-ins that must be compiled against a
    /// specific SDK.
    pub fn latest_sdk_asset(&self, sdk_version: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .filter(|a| a.sdk_version.as_deref() == Some(sdk_version))
            .max_by(|a, b| a.version.cmp(&b.version))
    }
}
