//! Exit code logic for the setup-downloader process.
//!
//! Single responsibility: map run outcomes to the process exit outcome.

use setup_downloader_core::{AcquisitionResult, OrganizeResult};

use crate::ProcessExit;

/// Exit outcome for a download run.
///
/// Interruption wins over everything; an aborted run (authentication lost
/// mid-run) is a failure; otherwise any per-item failure is partial.
pub(crate) fn determine_exit_outcome(result: &AcquisitionResult) -> ProcessExit {
    if result.interrupted {
        ProcessExit::Interrupted
    } else if result.aborted.is_some() {
        ProcessExit::Failure
    } else if result.failed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Success
    }
}

/// Exit outcome for an organize run.
pub(crate) fn determine_organize_outcome(result: &OrganizeResult) -> ProcessExit {
    if result.failed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Success
    }
}
