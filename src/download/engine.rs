//! Acquisition orchestrator: concurrent fetch, dedupe, and placement.
//!
//! # Overview
//!
//! [`Orchestrator::run`] lists a [`Provider`]'s items, skips those the
//! [`DownloadState`] ledger already holds at an up-to-date revision, and
//! acquires the rest concurrently: each unit paces, fetches with retry,
//! stages and hashes the bytes, then either places the file into the
//! destination tree or recognises it as a duplicate of a file already there.
//!
//! # Concurrency Model
//!
//! - Each item runs in its own Tokio task
//! - A semaphore permit is acquired before a task is spawned and held until
//!   the task finishes, so at most `max_concurrency` fetches are in flight
//! - [`DownloadState`] and the [`Deduplicator`] (which owns the hash cache)
//!   each sit behind a mutex; commits take them one at a time
//! - An interrupt flag stops scheduling; in-flight units get a short grace
//!   period and are then abandoned
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use setup_downloader_core::{
//!     AcquisitionOptions, CatalogIndex, Deduplicator, DownloadState, GoFastConfig,
//!     GoFastProvider, HashCache, Orchestrator, Resolver,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Arc::new(Resolver::new(Arc::new(CatalogIndex::bundled()?)));
//! let mut state = DownloadState::new("state.json");
//! state.load();
//! let dedup = Deduplicator::new(HashCache::load("hash_cache.json"));
//! let orchestrator = Orchestrator::new(resolver, state, dedup);
//!
//! let provider = Arc::new(GoFastProvider::new("token", GoFastConfig::default())?);
//! let result = orchestrator
//!     .run(provider, Path::new("./setups"), &AcquisitionOptions::default(), Arc::new(AtomicBool::new(false)))
//!     .await?;
//! println!("acquired {}, skipped {}, failed {}", result.acquired, result.skipped, result.failed);
//! # Ok(())
//! # }
//! ```

mod commit;
mod task;
mod unpack;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, INTERRUPT_GRACE, INTERRUPT_POLL,
    MAX_CONCURRENCY, MAX_PACING_DELAY, MAX_RETRIES_LIMIT, MIN_CONCURRENCY,
};
use super::error::RunError;
use super::filename::destination_dir;
use super::lock;
use super::pacing::Pacer;
use super::result::{AcquisitionResult, PlannedItem, RunStats};
use super::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::dedup::Deduplicator;
use crate::provider::{AcquirableItem, Provider};
use crate::resolver::Resolver;
use crate::state::DownloadState;

/// Default base delay for retry backoff.
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap on a single retry backoff delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(32);

/// Options for one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Maximum simultaneous fetches (1-20).
    pub max_concurrency: usize,
    /// Lower bound of the per-unit pacing delay.
    pub min_delay: Duration,
    /// Upper bound of the per-unit pacing delay.
    pub max_delay: Duration,
    /// Total fetch attempts per item, including the first (1-10).
    pub max_retries: u32,
    /// Plan only: no fetch, no writes, no ledger changes.
    pub dry_run: bool,
    /// Cap on the number of pending items scheduled.
    pub limit: Option<usize>,
    /// First retry backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Add random jitter to retry delays.
    pub retry_jitter: bool,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            dry_run: false,
            limit: None,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_jitter: true,
        }
    }
}

impl AcquisitionOptions {
    /// Checks every option against its accepted range.
    ///
    /// # Errors
    ///
    /// [`RunError::InvalidConcurrency`] or [`RunError::InvalidOptions`].
    pub fn validate(&self) -> Result<(), RunError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrency) {
            return Err(RunError::InvalidConcurrency {
                value: self.max_concurrency,
            });
        }
        if self.min_delay > self.max_delay {
            return Err(RunError::InvalidOptions {
                message: format!(
                    "min delay {}ms exceeds max delay {}ms",
                    self.min_delay.as_millis(),
                    self.max_delay.as_millis()
                ),
            });
        }
        if self.max_delay > MAX_PACING_DELAY {
            return Err(RunError::InvalidOptions {
                message: format!(
                    "max delay {}ms exceeds {}ms",
                    self.max_delay.as_millis(),
                    MAX_PACING_DELAY.as_millis()
                ),
            });
        }
        if !(1..=MAX_RETRIES_LIMIT).contains(&self.max_retries) {
            return Err(RunError::InvalidOptions {
                message: format!(
                    "max retries {} must be between 1 and {MAX_RETRIES_LIMIT}",
                    self.max_retries
                ),
            });
        }
        if self.limit == Some(0) {
            return Err(RunError::InvalidOptions {
                message: "limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.max_retries,
            self.retry_base_delay,
            MAX_RETRY_DELAY.max(self.retry_base_delay),
        );
        if self.retry_jitter {
            policy
        } else {
            policy.without_jitter()
        }
    }
}

/// Everything a spawned unit needs, shared by reference count.
pub(super) struct UnitContext {
    provider: Arc<dyn Provider>,
    resolver: Arc<Resolver>,
    state: Arc<Mutex<DownloadState>>,
    dedup: Arc<Mutex<Deduplicator>>,
    root: PathBuf,
    retry_policy: RetryPolicy,
    pacer: Pacer,
    stats: Arc<RunStats>,
    interrupted: Arc<AtomicBool>,
}

impl UnitContext {
    fn should_stop(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst) || self.stats.is_aborted()
    }
}

/// Drives acquisition runs against a ledger and a duplicate index.
///
/// Owns the run-scoped mutable stores; both are guarded by a mutex so
/// concurrent units never race on them.
#[derive(Debug)]
pub struct Orchestrator {
    resolver: Arc<Resolver>,
    state: Arc<Mutex<DownloadState>>,
    dedup: Arc<Mutex<Deduplicator>>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given stores.
    #[must_use]
    pub fn new(resolver: Arc<Resolver>, state: DownloadState, dedup: Deduplicator) -> Self {
        Self {
            resolver,
            state: Arc::new(Mutex::new(state)),
            dedup: Arc::new(Mutex::new(dedup)),
        }
    }

    /// The resolver used for destinations.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Runs `f` with the ledger locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&DownloadState) -> R) -> R {
        f(&lock(&self.state))
    }

    /// Runs `f` with the deduplicator locked.
    pub fn with_deduplicator<R>(&self, f: impl FnOnce(&mut Deduplicator) -> R) -> R {
        f(&mut lock(&self.dedup))
    }

    /// Destination directory for `item` under `root`.
    #[must_use]
    pub fn destination_for(&self, root: &Path, item: &AcquirableItem) -> PathBuf {
        item_destination(&self.resolver, root, item)
    }

    /// Runs one acquisition pass.
    ///
    /// Per-item failures never abort the run; they are collected into the
    /// result. An authentication failure while fetching stops scheduling and
    /// sets [`AcquisitionResult::aborted`].
    ///
    /// # Errors
    ///
    /// Run-level failures only: invalid options, unloaded state, listing
    /// failures ([`RunError::Auth`], [`RunError::ProviderUnreachable`]), an
    /// unusable destination root.
    #[allow(clippy::too_many_lines)]
    #[instrument(skip(self, provider, options, interrupted), fields(provider = provider.name(), root = %root.display()))]
    pub async fn run(
        &self,
        provider: Arc<dyn Provider>,
        root: &Path,
        options: &AcquisitionOptions,
        interrupted: Arc<AtomicBool>,
    ) -> Result<AcquisitionResult, RunError> {
        options.validate()?;
        if !lock(&self.state).is_loaded() {
            return Err(RunError::StateNotLoaded);
        }

        let items = provider
            .list()
            .await
            .map_err(|e| RunError::from_listing(provider.name(), e))?;
        let available = items.len();

        let (skipped, mut pending): (Vec<_>, Vec<_>) = {
            let state = lock(&self.state);
            items.into_iter().partition(|item| state.should_skip(item))
        };
        let skipped = skipped.len();
        if let Some(limit) = options.limit
            && pending.len() > limit
        {
            debug!(limit, pending = pending.len(), "limiting scheduled items");
            pending.truncate(limit);
        }
        info!(available, skipped, pending = pending.len(), "partitioned items");

        if options.dry_run {
            return Ok(self.plan(root, &pending, available, skipped));
        }

        std::fs::create_dir_all(root).map_err(|e| RunError::Destination {
            path: root.to_path_buf(),
            source: e,
        })?;

        let index_root = root.to_path_buf();
        let dedup = Arc::clone(&self.dedup);
        let index = tokio::task::spawn_blocking(move || {
            commit::clear_staging(&index_root);
            lock(&dedup).build_index(&index_root)
        })
        .await?;
        debug!(
            indexed_files = index.indexed_files,
            unique_hashes = index.unique_hashes,
            "destination indexed"
        );

        let stats = Arc::new(RunStats::default());
        let ctx = Arc::new(UnitContext {
            provider,
            resolver: Arc::clone(&self.resolver),
            state: Arc::clone(&self.state),
            dedup: Arc::clone(&self.dedup),
            root: root.to_path_buf(),
            retry_policy: options.retry_policy(),
            pacer: Pacer::new(options.min_delay, options.max_delay),
            stats: Arc::clone(&stats),
            interrupted: Arc::clone(&interrupted),
        });
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();

        for item in pending {
            if interrupted.load(Ordering::SeqCst) {
                stats.set_interrupted();
                break;
            }
            if stats.is_aborted() {
                break;
            }
            drain_finished_units(&mut handles, &stats).await;

            // Race the permit against interrupt/abort so a full pool does not
            // delay shutdown.
            let permit = tokio::select! {
                biased;
                () = async {
                    while !ctx.should_stop() {
                        tokio::time::sleep(INTERRUPT_POLL).await;
                    }
                } => {
                    if interrupted.load(Ordering::SeqCst) {
                        stats.set_interrupted();
                    }
                    None
                }
                result = Arc::clone(&semaphore).acquire_owned() => {
                    Some(result.map_err(|_| RunError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                break;
            };

            let unit_ctx = Arc::clone(&ctx);
            let item_id = item.id.clone();
            handles.push((
                item_id,
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    task::process_item(unit_ctx, item).await;
                }),
            ));
        }
        drain_finished_units(&mut handles, &stats).await;

        debug!(task_count = handles.len(), "waiting for units to complete");

        if interrupted.load(Ordering::SeqCst) {
            stats.set_interrupted();
            let deadline = tokio::time::Instant::now() + INTERRUPT_GRACE;
            for (id, mut handle) in handles {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    handle.abort();
                    continue;
                }
                match tokio::time::timeout(deadline - now, &mut handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => task::handle_task_join_error(&id, &e, &stats),
                    Err(_) => {
                        debug!(item_id = %id, "abandoning in-flight unit");
                        handle.abort();
                    }
                }
            }
        } else {
            for (id, handle) in handles {
                if let Err(e) = handle.await {
                    task::handle_task_join_error(&id, &e, &stats);
                }
            }
        }

        self.flush_stores();

        let result = stats.to_result(available, skipped);
        info!(
            available = result.available,
            skipped = result.skipped,
            acquired = result.acquired,
            failed = result.failed,
            duplicates = result.duplicates,
            retried = result.retried,
            interrupted = result.interrupted,
            "acquisition complete"
        );
        if let Some(reason) = &result.aborted {
            warn!(%reason, "run aborted before all items were scheduled");
        }
        Ok(result)
    }

    fn plan(
        &self,
        root: &Path,
        pending: &[AcquirableItem],
        available: usize,
        skipped: usize,
    ) -> AcquisitionResult {
        let planned: Vec<PlannedItem> = pending
            .iter()
            .map(|item| {
                let destination = self.destination_for(root, item);
                debug!(item_id = %item.id, destination = %destination.display(), "would acquire");
                PlannedItem {
                    item_id: item.id.clone(),
                    destination,
                }
            })
            .collect();

        info!(would_acquire = planned.len(), "dry run complete");
        AcquisitionResult {
            available,
            skipped,
            acquired: planned.len(),
            planned,
            ..AcquisitionResult::default()
        }
    }

    fn flush_stores(&self) {
        if let Err(e) = lock(&self.state).flush() {
            warn!(error = %e, "failed to flush download state");
        }
        if let Err(e) = lock(&self.dedup).cache_mut().flush() {
            warn!(error = %e, "failed to flush hash cache");
        }
    }
}

fn item_destination(resolver: &Resolver, root: &Path, item: &AcquirableItem) -> PathBuf {
    destination_dir(root, &item.subject, item_layout(resolver, item).as_deref())
}

/// Catalog layout path for the item's location, shared by every file the
/// item delivers. `None` leaves files directly in the subject folder.
fn item_layout(resolver: &Resolver, item: &AcquirableItem) -> Option<String> {
    let resolution = resolver.resolve_with_hint_text(&item.location, item.category_hint.as_deref());
    if resolution.is_unresolved() {
        debug!(item_id = %item.id, location = %item.location, "location unresolved, using subject folder");
    }
    resolution.relative_path().map(str::to_string)
}

async fn drain_finished_units(handles: &mut Vec<(String, JoinHandle<()>)>, stats: &RunStats) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (id, handle) = handles.swap_remove(idx);
            if let Err(e) = handle.await {
                task::handle_task_join_error(&id, &e, stats);
            }
        } else {
            idx += 1;
        }
    }
}
