//! Installation state machine.

use std::fmt;

/// Lifecycle states of an install task.
///
/// Forward transitions follow
/// `None -> Downloading -> Extracting -> Finalizing -> Installed`.
/// Any non-terminal state may instead move to `Cancelled` (user request)
/// or `Failed` (error). Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InstallState {
    /// Initial state; the task has not started.
    #[default]
    None,
    /// The archive is being transferred from the remote server.
    Downloading,
    /// The staged archive is being unpacked to the intermediate directory.
    Extracting,
    /// Extracted files are being moved into the install directory.
    Finalizing,
    /// Terminal: installation succeeded.
    Installed,
    /// Terminal: the user cancelled the task.
    Cancelled,
    /// Terminal: a phase failed.
    Failed,
}

impl InstallState {
    /// True for `Installed`, `Cancelled` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::Cancelled | Self::Failed)
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// From any non-terminal state `Cancelled` and `Failed` are legal
    /// targets; otherwise only the next forward phase is. Terminal states
    /// admit no transition at all.
    pub fn can_transition(&self, to: InstallState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(to, Self::Cancelled | Self::Failed) {
            return true;
        }
        matches!(
            (self, to),
            (Self::None, Self::Downloading)
                | (Self::Downloading, Self::Extracting)
                | (Self::Extracting, Self::Finalizing)
                | (Self::Finalizing, Self::Installed)
        )
    }

    /// Human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Downloading => "Downloading",
            Self::Extracting => "Extracting",
            Self::Finalizing => "Finalizing",
            Self::Installed => "Installed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
