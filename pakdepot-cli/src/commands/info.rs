//! The `info` command.

use pakdepot::manager::{ManagerError, PackageManager};

use crate::error::CliError;

/// Print the catalog record and local status for one package.
pub fn run(manager: &PackageManager, id: &str) -> Result<(), CliError> {
    let remote = manager
        .remote_package(id)
        .ok_or_else(|| ManagerError::PackageNotFound(id.to_string()))?;

    println!("{} - {}", remote.id(), remote.name());
    if !remote.package.author.is_empty() {
        println!("Author:      {}", remote.package.author);
    }
    if !remote.package.description.is_empty() {
        println!("Description: {}", remote.package.description);
    }

    println!("Assets:");
    let mut assets = remote.assets.clone();
    assets.sort_by(|a, b| b.version.cmp(&a.version));
    for asset in &assets {
        let sdk = asset
            .sdk_version
            .as_deref()
            .map(|s| format!(" (SDK {s})"))
            .unwrap_or_default();
        println!("  {} {}{}", asset.version, asset.file_name, sdk);
    }

    if let Some(local) = manager.local_package(id) {
        let local = local.read();
        println!("Status:      {}", local.status.name());
        if let Some(version) = local.version() {
            println!("Installed:   {version}");
        }
        if let Some(dir) = local.install_dir() {
            println!("Location:    {}", dir.display());
        }
        if let Some(err) = local.last_error() {
            println!("Last error:  {err}");
        }
    } else {
        println!("Status:      Not Installed");
    }
    Ok(())
}
