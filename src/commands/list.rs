//! List command: what a provider offers, whether it is held, and where it goes.

use std::path::Path;

use anyhow::{Context, Result};
use setup_downloader_core::download::destination_dir;
use setup_downloader_core::provider::AcquirableItem;
use setup_downloader_core::{DownloadState, Resolver};
use tracing::info;

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::cli::ListArgs;

pub async fn run_list_command(ctx: &RunContext, args: &ListArgs) -> Result<ProcessExit> {
    let mut settings = ctx.settings.clone();
    if let Some(token) = &args.token {
        settings.set_credential(args.provider, token);
    }
    let output_dir = args.output.as_ref().unwrap_or(&settings.output_dir).clone();
    let provider = super::build_provider(args.provider, &settings)?;

    let mut state = DownloadState::new(&settings.state_file);
    state.load();

    let items = provider
        .list()
        .await
        .with_context(|| format!("failed to list {} setups", provider.name()))?;

    let mut new_items = 0usize;
    for item in &items {
        let held = state.should_skip(item);
        if !held {
            new_items += 1;
        }
        println!("{}", render_item_row(&ctx.resolver, &output_dir, item, held));
    }

    info!(total = items.len(), new_items, "listing complete");
    println!("{} setups, {} new or updated", items.len(), new_items);
    Ok(ProcessExit::Success)
}

fn render_item_row(resolver: &Resolver, root: &Path, item: &AcquirableItem, held: bool) -> String {
    let resolution = resolver.resolve_with_hint_text(&item.location, item.category_hint.as_deref());
    let destination = destination_dir(root, &item.subject, resolution.relative_path());
    let status = if held { "up to date" } else { "new" };
    let unresolved = if resolution.is_unresolved() {
        " (track unresolved)"
    } else {
        ""
    };
    format!(
        "[{status}] {} | {} | {} -> {}{unresolved}",
        item.id,
        item.subject,
        item.location,
        destination.display()
    )
}
