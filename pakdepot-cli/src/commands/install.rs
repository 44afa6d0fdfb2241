//! The `install` command.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use pakdepot::manager::PackageManager;
use pakdepot::task::{InstallOptions, InstallTask};

use crate::error::CliError;

/// Install a package, rendering task progress as a bar per phase.
pub async fn run(
    manager: &PackageManager,
    id: &str,
    version: Option<&str>,
    sdk_version: Option<&str>,
) -> Result<(), CliError> {
    let mut options = InstallOptions::new();
    if let Some(version) = version {
        options = options.with_version(version);
    }
    if let Some(sdk_version) = sdk_version {
        options = options.with_sdk_version(sdk_version);
    }

    let bar = progress_bar();
    // Handlers go in through the pre-start hook so the first transition
    // and the earliest progress reach the bar.
    let task = manager.install_with(id, options, |task| attach(&bar, task))?;
    let asset = task.resolved_asset().expect("started task has an asset");
    println!("Installing {} {}", id, asset.version);

    watch(manager, &task, &bar, id).await
}

/// The bar shared by the install and update commands.
pub(crate) fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{msg:12} [{bar:40}] {pos:>3}%")
            .expect("static template")
            .progress_chars("=> "),
    );
    bar
}

/// Wire a task's state and progress events to the bar. Must run before
/// the task starts.
pub(crate) fn attach(bar: &ProgressBar, task: &InstallTask) {
    {
        let bar = bar.clone();
        task.on_state_change(Box::new(move |change| {
            bar.set_message(change.to.name().to_string());
        }));
    }
    {
        let bar = bar.clone();
        task.on_progress(Box::new(move |event| {
            bar.set_position(u64::from(event.percent));
        }));
    }
}

/// Wait for a started task, persist the records and report the outcome.
pub(crate) async fn watch(
    manager: &PackageManager,
    task: &InstallTask,
    bar: &ProgressBar,
    id: &str,
) -> Result<(), CliError> {
    // Ctrl-C requests cooperative cancellation instead of killing the
    // process mid-write.
    {
        let task = task.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, cancelling installation");
                task.cancel();
            }
        });
    }

    task.wait().await;
    bar.finish_and_clear();
    manager.save_records()?;

    if task.success() {
        let version = task
            .resolved_asset()
            .map(|asset| asset.version.to_string())
            .unwrap_or_default();
        let local = task.local();
        let local = local.read();
        println!(
            "Installed {} {} to {}",
            id,
            version,
            local
                .install_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        Ok(())
    } else if let Some(err) = task.error() {
        Err(CliError::InstallFailed(err))
    } else {
        Err(CliError::Cancelled)
    }
}
