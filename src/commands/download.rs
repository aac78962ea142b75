//! Download command: one acquisition pass against a provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use setup_downloader_core::{
    AcquisitionOptions, AcquisitionResult, Deduplicator, DownloadState, HashCache, Orchestrator,
};
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::app::exit_handler;
use crate::app::progress_manager::RunSpinner;
use crate::cli::DownloadArgs;

pub async fn run_download_command(ctx: &RunContext, args: &DownloadArgs) -> Result<ProcessExit> {
    let settings = ctx.settings.clone().with_download_args(args)?;
    let provider = super::build_provider(args.provider, &settings)?;

    let mut state = DownloadState::new(&settings.state_file);
    state.load();
    if state.recovered_from_corruption() {
        warn!(path = %settings.state_file.display(), "download state was unreadable, starting fresh");
    }
    let cache = HashCache::load(&settings.hash_cache_file);
    let orchestrator = Orchestrator::new(Arc::clone(&ctx.resolver), state, Deduplicator::new(cache));

    let options = AcquisitionOptions {
        max_concurrency: settings.concurrency,
        min_delay: settings.min_delay,
        max_delay: settings.max_delay,
        max_retries: settings.max_retries,
        dry_run: args.dry_run,
        limit: args.limit.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
        ..AcquisitionOptions::default()
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let message = if args.dry_run {
        format!("Planning {} setups", provider.name())
    } else {
        format!("Downloading {} setups", provider.name())
    };
    let spinner = RunSpinner::start(ctx.spinner, message);
    let outcome = orchestrator
        .run(provider, &settings.output_dir, &options, interrupted)
        .await;
    drop(spinner);

    let result = outcome.context("download run failed")?;
    info!(
        available = result.available,
        acquired = result.acquired,
        skipped = result.skipped,
        failed = result.failed,
        output_dir = %settings.output_dir.display(),
        "Download Summary"
    );
    if !ctx.quiet {
        for line in summary_lines(&result, args.dry_run) {
            println!("{line}");
        }
    }

    Ok(exit_handler::determine_exit_outcome(&result))
}

/// Human-readable run summary, one line per entry.
fn summary_lines(result: &AcquisitionResult, dry_run: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if dry_run {
        lines.push(format!(
            "Dry run: {} of {} setups would be downloaded ({} up to date)",
            result.acquired, result.available, result.skipped
        ));
        for planned in &result.planned {
            lines.push(format!("- {} -> {}", planned.item_id, planned.destination.display()));
        }
        return lines;
    }

    let mut summary = format!(
        "Available: {}, Downloaded: {}, Skipped: {}, Failed: {}",
        result.available, result.acquired, result.skipped, result.failed
    );
    if result.duplicates > 0 {
        summary.push_str(&format!(", Duplicates: {}", result.duplicates));
    }
    if result.retried > 0 {
        summary.push_str(&format!(", Retries: {}", result.retried));
    }
    lines.push(summary);

    if !result.failures.is_empty() {
        lines.push("Failures:".to_string());
        for failure in &result.failures {
            lines.push(format!("- {}: {}", failure.item_id, failure.reason));
        }
    }
    if let Some(reason) = &result.aborted {
        lines.push(format!("Run aborted: {reason}"));
    }
    if result.interrupted {
        lines.push("Interrupted: run stopped before all setups finished".to_string());
    }
    lines
}
