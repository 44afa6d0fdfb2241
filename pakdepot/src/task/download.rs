//! Download phase adapter.
//!
//! Translates byte-level transfer events from the transport into
//! task-level progress and phase decisions. The driver feeds transport
//! progress through [`transfer_percent`] and the transport's terminal
//! result through [`map_transfer_result`]; the
//! [`ProgressTracker`](super::progress::ProgressTracker) then suppresses
//! anything that does not increase.

use crate::transport::{TransferSummary, TransportError};

use super::error::InstallError;

/// What the driver should do after a phase step concludes.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PhaseStep {
    /// The phase succeeded; move on to the next phase.
    Advance,
    /// The cancellation flag was observed; the cancel path has already
    /// produced the terminal state.
    Cancelled,
    /// The phase failed; transition to `Failed` with this error.
    Failed(InstallError),
}

/// Convert transfer byte progress to a [0, 100] percentage.
///
/// Returns `None` while the total is unknown; completion still advances
/// the task, so an unsized transfer simply reports no intermediate
/// percentages.
pub(crate) fn transfer_percent(bytes_received: u64, total_bytes: u64) -> Option<u8> {
    if total_bytes == 0 {
        return None;
    }
    let percent = bytes_received.saturating_mul(100) / total_bytes;
    Some(percent.min(100) as u8)
}

/// Interpret the transport's terminal result.
pub(crate) fn map_transfer_result(
    result: Result<TransferSummary, TransportError>,
) -> PhaseStep {
    match result {
        Ok(_) => PhaseStep::Advance,
        Err(TransportError::Cancelled) => PhaseStep::Cancelled,
        Err(err) => PhaseStep::Failed(InstallError::Download(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_percent_floors() {
        assert_eq!(transfer_percent(0, 1000), Some(0));
        assert_eq!(transfer_percent(259, 1000), Some(25));
        assert_eq!(transfer_percent(999, 1000), Some(99));
        assert_eq!(transfer_percent(1000, 1000), Some(100));
    }

    #[test]
    fn test_transfer_percent_clamps_over_100() {
        // Server sent more bytes than the advertised total.
        assert_eq!(transfer_percent(1500, 1000), Some(100));
    }

    #[test]
    fn test_transfer_percent_unknown_total() {
        assert_eq!(transfer_percent(4096, 0), None);
    }

    #[test]
    fn test_transfer_percent_huge_values() {
        let total = u64::MAX / 2;
        assert_eq!(transfer_percent(total, total), Some(100));
    }

    #[test]
    fn test_successful_transfer_advances() {
        let step = map_transfer_result(Ok(TransferSummary { bytes_received: 42 }));
        assert_eq!(step, PhaseStep::Advance);
    }

    #[test]
    fn test_cancelled_transfer_is_not_a_failure() {
        let step = map_transfer_result(Err(TransportError::Cancelled));
        assert_eq!(step, PhaseStep::Cancelled);
    }

    #[test]
    fn test_failed_transfer_carries_download_error() {
        let step = map_transfer_result(Err(TransportError::Status {
            url: "http://x/a.tgz".into(),
            status: 503,
        }));
        match step {
            PhaseStep::Failed(InstallError::Download(reason)) => {
                assert!(reason.contains("503"));
            }
            other => panic!("expected download failure, got {other:?}"),
        }
    }
}
