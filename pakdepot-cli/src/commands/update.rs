//! The `update` command.

use pakdepot::manager::PackageManager;

use crate::error::CliError;

use super::install::{attach, progress_bar, watch};

/// Update one package to its latest catalog version, or every installed
/// package with an update available when no id is given.
pub async fn run(manager: &PackageManager, id: Option<&str>) -> Result<(), CliError> {
    let targets: Vec<String> = match id {
        Some(id) => vec![id.to_string()],
        None => manager.updatable_packages(),
    };
    if targets.is_empty() {
        println!("All packages are up to date.");
        return Ok(());
    }

    for id in &targets {
        let bar = progress_bar();
        let task = manager.update_with(id, |task| attach(&bar, task))?;
        let asset = task.resolved_asset().expect("started task has an asset");
        println!("Updating {} to {}", id, asset.version);
        watch(manager, &task, &bar, id).await?;
    }
    Ok(())
}
