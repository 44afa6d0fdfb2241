//! The `list` command.

use pakdepot::manager::PackageManager;

use crate::error::CliError;

/// List catalog packages with their latest version and local status.
pub fn run(manager: &PackageManager) -> Result<(), CliError> {
    let mut packages = manager.remote_packages();
    packages.sort_by(|a, b| a.id().cmp(b.id()));

    if packages.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }

    for remote in packages {
        let latest = remote
            .latest_asset()
            .map(|a| a.version.to_string())
            .unwrap_or_else(|| "-".to_string());

        let status = manager
            .local_package(remote.id())
            .map(|local| {
                let local = local.read();
                match local.version() {
                    Some(version) => format!("{} ({version})", local.status.name()),
                    None => local.status.name().to_string(),
                }
            })
            .unwrap_or_else(|| "Not Installed".to_string());

        println!("{:<28} {:<10} {}", remote.id(), latest, status);
    }
    Ok(())
}
