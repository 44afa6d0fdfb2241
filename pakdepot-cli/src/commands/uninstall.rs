//! The `uninstall` command.

use pakdepot::manager::PackageManager;

use crate::error::CliError;

/// Remove an installed package's files and reset its record.
pub fn run(manager: &PackageManager, id: &str) -> Result<(), CliError> {
    manager.uninstall(id)?;
    println!("Uninstalled {id}");
    Ok(())
}
