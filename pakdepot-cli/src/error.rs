//! CLI error type.

use thiserror::Error;

use pakdepot::manager::ManagerError;
use pakdepot::task::InstallError;

/// Errors surfaced to the CLI user.
#[derive(Debug, Error)]
pub enum CliError {
    /// A manager operation failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// An installation terminated unsuccessfully.
    #[error("installation failed: {0}")]
    InstallFailed(InstallError),

    /// The user cancelled the installation.
    #[error("installation cancelled")]
    Cancelled,
}
