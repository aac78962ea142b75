//! One unit of work: pace, fetch with retry, stage, unpack bundles, commit.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{Instrument, debug, info, info_span, warn};

use super::commit::{self, CommitOutcome, StagedAsset};
use super::{UnitContext, item_layout, unpack};
use crate::download::error::AcquireError;
use crate::download::filename::destination_dir;
use crate::download::result::RunStats;
use crate::download::retry::{RetryDecision, classify_error, retry_after_delay};
use crate::provider::{AcquirableItem, Packaging};

/// Acquires a single item and records the outcome in the run stats.
///
/// Never returns an error: failures become entries in the failure list.
pub(super) async fn process_item(ctx: Arc<UnitContext>, item: AcquirableItem) {
    let span = info_span!("unit", item_id = %item.id, provider = %item.provider);
    async move {
        ctx.pacer.pause().await;
        if ctx.should_stop() {
            debug!("stopping before fetch");
            return;
        }

        let layout = item_layout(&ctx.resolver, &item);
        let staged = match acquire_with_retry(&ctx, &item).await {
            Ok(Some(staged)) => staged,
            Ok(None) => return,
            Err(e) => {
                fail(&ctx, &item, &e);
                return;
            }
        };

        let members = match staged.packaging {
            Packaging::Plain => vec![staged],
            Packaging::Zip => match unpack_blocking(Arc::clone(&ctx), item.clone(), staged).await {
                Ok(members) => members,
                Err(e) => {
                    fail(&ctx, &item, &e);
                    return;
                }
            },
        };
        let placed: Vec<(StagedAsset, PathBuf)> = members
            .into_iter()
            .map(|member| {
                let subject = member.subject.as_deref().unwrap_or(&item.subject);
                let dir = destination_dir(&ctx.root, subject, layout.as_deref());
                (member, dir)
            })
            .collect();

        match commit_blocking(Arc::clone(&ctx), item.clone(), placed).await {
            Ok(outcomes) => report(&ctx, &outcomes),
            Err(e) => fail(&ctx, &item, &e),
        }
    }
    .instrument(span)
    .await;
}

/// Fetches and stages the item, retrying per the run's policy.
///
/// Returns `Ok(None)` when the run stopped while waiting to retry.
async fn acquire_with_retry(
    ctx: &UnitContext,
    item: &AcquirableItem,
) -> Result<Option<StagedAsset>, AcquireError> {
    let staging = commit::staging_path(&ctx.root, item);
    let mut attempt: u32 = 1;

    loop {
        let result = match ctx.provider.fetch(item).await {
            Ok(asset) => commit::stage(asset, &staging).await,
            Err(e) => Err(AcquireError::from(e)),
        };
        let error = match result {
            Ok(staged) => return Ok(Some(staged)),
            Err(e) => e,
        };

        let failure_type = classify_error(&error);
        match ctx.retry_policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                let delay = retry_after_delay(&error).unwrap_or(delay);
                warn!(
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "fetch failed, retrying"
                );
                ctx.stats.increment_retried();
                tokio::time::sleep(delay).await;
                if ctx.should_stop() {
                    debug!("stopping before retry");
                    return Ok(None);
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(attempt, %reason, "giving up");
                return Err(error);
            }
        }
    }
}

async fn unpack_blocking(
    ctx: Arc<UnitContext>,
    item: AcquirableItem,
    archive: StagedAsset,
) -> Result<Vec<StagedAsset>, AcquireError> {
    let path = archive.path.clone();
    tokio::task::spawn_blocking(move || unpack::unpack(&archive, &item, ctx.provider.as_ref()))
        .await
        .unwrap_or_else(|e| {
            Err(AcquireError::io(
                path,
                std::io::Error::other(format!("unpack task failed: {e}")),
            ))
        })
}

async fn commit_blocking(
    ctx: Arc<UnitContext>,
    item: AcquirableItem,
    members: Vec<(StagedAsset, PathBuf)>,
) -> Result<Vec<CommitOutcome>, AcquireError> {
    let staging = members
        .first()
        .map(|(staged, _)| staged.path.clone())
        .unwrap_or_default();
    match tokio::task::spawn_blocking(move || commit::commit(&ctx, &item, &members)).await {
        Ok(result) => result,
        Err(e) => Err(AcquireError::io(
            staging,
            std::io::Error::other(format!("commit task failed: {e}")),
        )),
    }
}

/// Counts the item once: acquired when any file was written, otherwise a
/// duplicate.
fn report(ctx: &UnitContext, outcomes: &[CommitOutcome]) {
    let mut written_bytes: u64 = 0;
    let mut any_written = false;
    for outcome in outcomes {
        match outcome {
            CommitOutcome::Written { path, bytes } => {
                info!(path = %path.display(), bytes, "acquired");
                written_bytes += bytes;
                any_written = true;
            }
            CommitOutcome::Duplicate { existing } => {
                info!(existing = %existing.display(), "duplicate content, skipped");
            }
        }
    }
    if any_written {
        ctx.stats.increment_acquired(written_bytes);
    } else {
        ctx.stats.increment_duplicates();
    }
}

fn fail(ctx: &UnitContext, item: &AcquirableItem, error: &AcquireError) {
    warn!(error = %error, "acquisition failed");
    if error.is_auth() {
        ctx.stats.abort(error.to_string());
    }
    ctx.stats.record_failure(&item.id, error.to_string());
}

/// Records a panicked or cancelled unit as a failure.
pub(super) fn handle_task_join_error(item_id: &str, error: &JoinError, stats: &RunStats) {
    if error.is_cancelled() {
        debug!(item_id, "unit cancelled");
        return;
    }
    warn!(item_id, error = %error, "unit panicked");
    stats.record_failure(item_id, format!("task panicked: {error}"));
}
