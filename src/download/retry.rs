//! Retry decisions for failed fetches.
//!
//! A failed fetch is sorted into a [`FailureType`], and
//! [`RetryPolicy::should_retry`] turns that plus the attempt number into a
//! [`RetryDecision`].
//!
//! `max_attempts` counts every fetch of an item including the first, so the
//! default of 3 allows two retries. Backoff starts at the base delay, doubles
//! per attempt and is capped (32 s by default). When a rate-limited response
//! names its own wait in Retry-After, [`retry_after_delay`] supplies it and
//! the caller uses it instead of the computed backoff.
//!
//! # Example
//!
//! ```
//! use setup_downloader_core::download::{AcquireError, RetryDecision, RetryPolicy, classify_error};
//! use setup_downloader_core::provider::ProviderError;
//!
//! let policy = RetryPolicy::default();
//! let error = AcquireError::from(ProviderError::http_status("https://example.com/a.zip", 503));
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => println!("attempt {attempt} in {delay:?}"),
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::AcquireError;
use super::pacing::parse_retry_after;
use crate::provider::ProviderError;

/// Default fetch attempts per item, the first one included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Upper bound of the random spread added to each backoff.
const MAX_JITTER_MS: u64 = 500;

/// How a failure affects the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed later: timeouts, 5xx, dropped connections, short bodies.
    Transient,
    /// Will fail the same way again: 404, unreadable archives, local disk errors.
    Permanent,
    /// Credentials were rejected. Never retried; the run stops scheduling.
    NeedsAuth,
    /// The provider asked us to slow down.
    RateLimited,
}

/// Answer from [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Fetch again after `delay`.
    Retry {
        /// Computed backoff.
        delay: Duration,
        /// Number of the attempt about to be made (the first retry is 2).
        attempt: u32,
    },
    /// Stop and report the failure.
    DoNotRetry {
        /// Why.
        reason: String,
    },
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` fetches in total (at least one), with
    /// backoff doubling from `base_delay` up to `max_delay`.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: true,
        }
    }

    /// Disables jitter, making delays exact.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total fetch attempts allowed per item.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows the failure of attempt number `attempt` (1-based).
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "credentials rejected".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("all {} attempts used", self.max_attempts),
            };
        }

        let delay = self.backoff(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), ?failure_type, "scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// `base * 2^(attempt - 1)`, capped at the maximum, plus jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        if self.jitter {
            delay + Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS))
        } else {
            delay
        }
    }
}

/// Sorts a per-item error for the retry decision.
#[must_use]
pub fn classify_error(error: &AcquireError) -> FailureType {
    match error {
        AcquireError::Provider(e) => classify_provider_error(e),
        AcquireError::Integrity { .. } => FailureType::Transient,
        AcquireError::Io { .. }
        | AcquireError::EmptyBody { .. }
        | AcquireError::Archive { .. }
        | AcquireError::EmptyArchive { .. }
        | AcquireError::Hash(_)
        | AcquireError::State(_) => FailureType::Permanent,
    }
}

/// Sorts a provider error.
///
/// Providers already turn 401/403, 404 and 429 into their own variants, so an
/// [`ProviderError::HttpStatus`] only needs the timeout/server-side split.
#[must_use]
pub fn classify_provider_error(error: &ProviderError) -> FailureType {
    match error {
        ProviderError::Auth { .. } => FailureType::NeedsAuth,
        ProviderError::RateLimited { .. } => FailureType::RateLimited,
        ProviderError::HttpStatus { status, .. } if *status == 408 || *status >= 500 => {
            FailureType::Transient
        }
        ProviderError::NotFound { .. }
        | ProviderError::HttpStatus { .. }
        | ProviderError::InvalidResponse { .. } => FailureType::Permanent,
        ProviderError::Network { .. }
        | ProviderError::Timeout { .. }
        | ProviderError::Transient { .. } => FailureType::Transient,
    }
}

/// The wait a rate-limited response asked for, overriding computed backoff.
#[must_use]
pub fn retry_after_delay(error: &AcquireError) -> Option<Duration> {
    match error {
        AcquireError::Provider(ProviderError::RateLimited {
            retry_after: Some(value),
            ..
        }) => parse_retry_after(value),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn exact(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), DEFAULT_MAX_DELAY).without_jitter()
    }

    fn rate_limited(retry_after: Option<&str>) -> AcquireError {
        AcquireError::from(ProviderError::RateLimited {
            url: "https://example.com/a.zip".to_string(),
            retry_after: retry_after.map(str::to_string),
        })
    }

    // ==================== Attempt Budget Tests ====================

    #[test]
    fn test_max_attempts_counts_the_first_fetch() {
        let policy = exact(3);
        let mut attempt = 1;
        let mut fetches = 1;
        while let RetryDecision::Retry { attempt: next, .. } =
            policy.should_retry(FailureType::Transient, attempt)
        {
            attempt = next;
            fetches += 1;
        }
        assert_eq!(fetches, 3);
        assert_eq!(attempt, 3);
    }

    #[test]
    fn test_single_attempt_budget_never_retries() {
        let policy = exact(1);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_permanent_and_auth_stop_on_first_failure() {
        let policy = exact(5);
        for failure in [FailureType::Permanent, FailureType::NeedsAuth] {
            assert!(matches!(
                policy.should_retry(failure, 1),
                RetryDecision::DoNotRetry { .. }
            ));
        }
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
    }

    // ==================== Backoff Tests ====================

    #[test]
    fn test_backoff_doubles_then_caps_at_32_seconds() {
        let policy = exact(10);
        let delays: Vec<u64> = (1..10)
            .map(|attempt| match policy.should_retry(FailureType::Transient, attempt) {
                RetryDecision::Retry { delay, .. } => delay.as_secs(),
                RetryDecision::DoNotRetry { reason } => panic!("stopped early: {reason}"),
            })
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 32, 32, 32]);
    }

    #[test]
    fn test_backoff_cap_survives_huge_attempt_numbers() {
        let policy = exact(u32::MAX);
        match policy.should_retry(FailureType::Transient, 200) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, DEFAULT_MAX_DELAY),
            RetryDecision::DoNotRetry { reason } => panic!("{reason}"),
        }
    }

    #[test]
    fn test_jitter_stays_within_half_a_second() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), DEFAULT_MAX_DELAY);
        for _ in 0..50 {
            let RetryDecision::Retry { delay, .. } = policy.should_retry(FailureType::Transient, 1)
            else {
                panic!("expected retry");
            };
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    // ==================== Retry-After Tests ====================

    #[test]
    fn test_retry_after_seconds_override_backoff() {
        assert_eq!(retry_after_delay(&rate_limited(Some("7"))), Some(Duration::from_secs(7)));
        assert_eq!(retry_after_delay(&rate_limited(Some("0"))), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_absent_or_unparseable_keeps_backoff() {
        assert_eq!(retry_after_delay(&rate_limited(None)), None);
        assert_eq!(retry_after_delay(&rate_limited(Some("soon"))), None);
        let unavailable = AcquireError::from(ProviderError::http_status("u", 503));
        assert_eq!(retry_after_delay(&unavailable), None);
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_typed_provider_errors() {
        assert_eq!(
            classify_error(&AcquireError::from(ProviderError::auth("gofast", "expired"))),
            FailureType::NeedsAuth
        );
        assert_eq!(classify_error(&rate_limited(None)), FailureType::RateLimited);
        assert_eq!(
            classify_error(&AcquireError::from(ProviderError::NotFound { url: "u".into() })),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&AcquireError::from(ProviderError::transient("reset"))),
            FailureType::Transient
        );
    }

    #[test]
    fn test_classify_remaining_statuses() {
        let status = |code| classify_provider_error(&ProviderError::http_status("u", code));
        assert_eq!(status(500), FailureType::Transient);
        assert_eq!(status(503), FailureType::Transient);
        assert_eq!(status(408), FailureType::Transient);
        assert_eq!(status(400), FailureType::Permanent);
        assert_eq!(status(410), FailureType::Permanent);
    }

    #[test]
    fn test_classify_local_failures() {
        let short = AcquireError::Integrity {
            path: "/tmp/a.part".into(),
            expected_bytes: 10,
            actual_bytes: 4,
        };
        assert_eq!(classify_error(&short), FailureType::Transient);

        let bad_zip = AcquireError::Archive {
            path: "/tmp/a.part".into(),
            message: "invalid Zip archive".to_string(),
        };
        assert_eq!(classify_error(&bad_zip), FailureType::Permanent);

        let disk = AcquireError::io("/tmp/a", std::io::Error::other("disk full"));
        assert_eq!(classify_error(&disk), FailureType::Permanent);
    }
}
