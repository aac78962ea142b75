//! Organize command: move setups already on disk into the catalog layout.

use std::sync::Arc;

use anyhow::{Context, Result};
use setup_downloader_core::organize::{ActionOutcome, OrganizeAction, SkipReason};
use setup_downloader_core::{Deduplicator, HashCache, OrganizeOptions, OrganizeResult, Organizer};
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::app::exit_handler;
use crate::cli::OrganizeArgs;

pub async fn run_organize_command(ctx: &RunContext, args: &OrganizeArgs) -> Result<ProcessExit> {
    let source = args.source.clone();
    let destination = args.output.clone().unwrap_or_else(|| source.clone());
    let options = OrganizeOptions {
        copy: args.copy,
        category_hint: args.category.clone(),
        dry_run: args.dry_run,
    };
    let organizer = Organizer::new(Arc::clone(&ctx.resolver));
    let cache_path = ctx.settings.hash_cache_file.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<OrganizeResult> {
        let mut dedup = Deduplicator::new(HashCache::load(&cache_path));
        let result = organizer
            .run(&mut dedup, &source, &destination, &options)
            .context("organize failed")?;
        if !options.dry_run {
            let mut cache = dedup.into_cache();
            if let Err(e) = cache.flush() {
                warn!(error = %e, "failed to save hash cache");
            }
        }
        Ok(result)
    })
    .await
    .context("organize task failed")??;

    info!(
        total = result.total,
        organized = result.organized,
        skipped = result.skipped,
        failed = result.failed,
        "Organize Summary"
    );
    if !ctx.quiet {
        for action in &result.actions {
            if let Some(line) = render_action_line(action, args.dry_run, args.copy) {
                println!("{line}");
            }
        }
        if args.dry_run {
            println!("Dry run - no files changed");
        }
        println!("{result}");
        if result.bytes_saved > 0 {
            println!("Freed {} bytes of duplicate setups", result.bytes_saved);
        }
    }

    Ok(exit_handler::determine_organize_outcome(&result))
}

/// One output line per action; in-place skips are not shown.
fn render_action_line(action: &OrganizeAction, dry_run: bool, copy: bool) -> Option<String> {
    let source = action.source.display();
    let line = match &action.outcome {
        ActionOutcome::Organized | ActionOutcome::Planned => {
            let verb = match (dry_run, copy) {
                (true, false) => "would move",
                (true, true) => "would copy",
                (false, false) => "moved",
                (false, true) => "copied",
            };
            let destination = action
                .destination
                .as_ref()
                .map_or_else(String::new, |path| path.display().to_string());
            format!("[{verb}] {source} -> {destination}")
        }
        ActionOutcome::Skipped(reason) => match reason {
            SkipReason::AlreadyInPlace => return None,
            other => format!("[skipped] {source}: {other}"),
        },
        ActionOutcome::Duplicate { existing, deleted } => {
            let note = if *deleted { ", deleted" } else { "" };
            format!("[duplicate] {source} (same as {}{note})", existing.display())
        }
        ActionOutcome::Failed(reason) => format!("[failed] {source}: {reason}"),
    };
    Some(line)
}
