//! CLI entry point for the setup downloader.

use std::process::ExitCode;

mod app;
mod app_config;
mod cli;
mod commands;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything succeeded (or there was nothing to do).
    Success,
    /// Run-level error or aborted run.
    Failure,
    /// Completed with per-item failures.
    Partial,
    /// Stopped by Ctrl-C.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
            Self::Interrupted => 130,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_setup_downloader().await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}
