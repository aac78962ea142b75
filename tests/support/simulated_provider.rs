//! In-process provider with scripted behaviour.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use setup_downloader_core::provider::{
    AcquirableItem, FetchHandle, FetchedAsset, Provider, ProviderError,
};

pub const SIMULATED_PROVIDER: &str = "sim";

/// Scripted outcome for one fetch attempt.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// `HTTP 503`, retryable.
    Unavailable,
    /// `HTTP 404`, permanent.
    NotFound,
    /// `HTTP 401`.
    Unauthorized,
    /// `HTTP 429` with an optional Retry-After value.
    RateLimited(Option<&'static str>),
}

impl Scripted {
    fn to_error(&self, url: &str) -> ProviderError {
        match self {
            Self::Unavailable => ProviderError::http_status(url, 503),
            Self::NotFound => ProviderError::NotFound {
                url: url.to_string(),
            },
            Self::Unauthorized => ProviderError::auth(SIMULATED_PROVIDER, "token rejected"),
            Self::RateLimited(retry_after) => ProviderError::RateLimited {
                url: url.to_string(),
                retry_after: retry_after.map(str::to_string),
            },
        }
    }
}

/// Provider serving in-memory bodies, tracking concurrency and attempts.
#[derive(Default)]
pub struct SimulatedProvider {
    items: Vec<AcquirableItem>,
    bodies: HashMap<String, Vec<u8>>,
    /// Per-item failures, consumed one per attempt before the body is served.
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    list_error: Option<Scripted>,
    fetch_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetches: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    /// Set after the first fetch completes, for interrupt tests.
    interrupt_after_first: Option<std::sync::Arc<AtomicBool>>,
}

impl SimulatedProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item whose body is `body`.
    #[must_use]
    pub fn with_item(mut self, item: AcquirableItem, body: &[u8]) -> Self {
        self.bodies.insert(item.id.clone(), body.to_vec());
        self.items.push(item);
        self
    }

    /// Fails the first fetches of `id` with `failures`, in order.
    #[must_use]
    pub fn with_failures(self, id: &str, failures: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), failures);
        self
    }

    #[must_use]
    pub fn with_list_error(mut self, error: Scripted) -> Self {
        self.list_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    #[must_use]
    pub fn interrupting(mut self, flag: std::sync::Arc<AtomicBool>) -> Self {
        self.interrupt_after_first = Some(flag);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, id: &str) -> usize {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        SIMULATED_PROVIDER
    }

    async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError> {
        if let Some(error) = &self.list_error {
            return Err(error.to_error("sim://list"));
        }
        Ok(self.items.clone())
    }

    async fn fetch(&self, item: &AcquirableItem) -> Result<FetchedAsset, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(item.id.clone())
            .or_insert(0) += 1;

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(flag) = &self.interrupt_after_first {
            flag.store(true, Ordering::SeqCst);
        }

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&item.id).and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
        };
        if let Some(failure) = scripted {
            return Err(failure.to_error(item.handle.as_str()));
        }

        let body = self
            .bodies
            .get(&item.id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                url: item.handle.as_str().to_string(),
            })?;
        Ok(FetchedAsset::from_bytes(format!("{}.sto", item.id), body))
    }
}

/// Builds an item with sensible defaults.
#[must_use]
pub fn item(id: &str, subject: &str, location: &str, revision: &str) -> AcquirableItem {
    AcquirableItem {
        provider: SIMULATED_PROVIDER.to_string(),
        id: id.to_string(),
        subject: subject.to_string(),
        location: location.to_string(),
        category_hint: None,
        revision: revision.to_string(),
        series: None,
        season: None,
        handle: FetchHandle::new(format!("sim://{id}")),
    }
}
