//! Package records shared between the remote catalog and the local store.
//!
//! Three views of a package exist:
//! - [`Package`]: the identity common to every context (id, name, author).
//! - [`RemotePackage`]: a catalog entry with downloadable [`Asset`]s.
//! - [`LocalPackage`]: the package as installed (or being installed) on
//!   this machine, including its file [`Manifest`] and error history.
//!
//! Records are plain JSON, matching the catalog format served by package
//! repositories.

mod asset;
mod local;
mod remote;

pub use asset::Asset;
pub use local::{LocalPackage, Manifest, PackageStatus};
pub use remote::RemotePackage;

use serde::{Deserialize, Serialize};

/// Core package identity.
///
/// Shared across the remote catalog, the local store, and install tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Unique package identifier (e.g. "surveillancemodeplugin").
    pub id: String,

    /// Human-readable package name.
    pub name: String,

    /// Package author.
    #[serde(default)]
    pub author: String,

    /// Short description of the package.
    #[serde(default)]
    pub description: String,
}

impl Package {
    /// Create a new package identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            author: String::new(),
            description: String::new(),
        }
    }

    /// A package record is valid when it carries an id and a name.
    pub fn valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}
