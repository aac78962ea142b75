//! Jittered pacing between fetches and Retry-After parsing.
//!
//! Every unit of work waits a delay drawn uniformly from `[min, max]`
//! before its first fetch, spreading requests over time so a provider
//! sees a human-ish request rate. Pacing is not correctness-critical;
//! a zero range disables it.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use setup_downloader_core::download::Pacer;
//!
//! let pacer = Pacer::new(Duration::from_millis(100), Duration::from_millis(300));
//! let delay = pacer.next_delay();
//! assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(300));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Uniform random delay source shared by every unit of a run.
///
/// Clones share the cumulative-delay counter.
#[derive(Debug, Clone)]
pub struct Pacer {
    min: Duration,
    max: Duration,
    cumulative_ms: Arc<AtomicU64>,
    warned: Arc<AtomicBool>,
}

impl Pacer {
    /// Creates a pacer drawing from `[min, max]`. Reversed bounds are swapped.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            cumulative_ms: Arc::new(AtomicU64::new(0)),
            warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Returns true when no delay will ever be applied.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws the next delay.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let low = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let high = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Total delay handed out so far.
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_ms.load(Ordering::SeqCst))
    }

    /// Sleeps for the next delay and returns it.
    #[instrument(level = "debug", skip(self))]
    pub async fn pause(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }

        let delay = self.next_delay();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let total_ms = self.cumulative_ms.fetch_add(delay_ms, Ordering::SeqCst) + delay_ms;
        if Duration::from_millis(total_ms) > CUMULATIVE_DELAY_WARNING_THRESHOLD
            && !self.warned.swap(true, Ordering::SeqCst)
        {
            warn!(
                cumulative_ms = total_ms,
                threshold_ms = CUMULATIVE_DELAY_WARNING_THRESHOLD.as_millis(),
                "pacing delay is adding up; lower the delay range for faster runs"
            );
        }

        debug!(delay_ms, "pacing before fetch");
        tokio::time::sleep(delay).await;
        delay
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds (`"120"`) and HTTP-dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Values are capped at one hour;
/// dates in the past yield zero; negative or unparseable values yield `None`.
///
/// ```
/// use std::time::Duration;
/// use setup_downloader_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        let duration = Duration::from_secs(seconds);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past");
            Some(Duration::ZERO)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Pacer Tests ====================

    #[test]
    fn test_pacer_draws_within_bounds() {
        let pacer = Pacer::new(Duration::from_millis(10), Duration::from_millis(40));
        for _ in 0..200 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(40));
        }
    }

    #[test]
    fn test_pacer_swaps_reversed_bounds() {
        let pacer = Pacer::new(Duration::from_millis(40), Duration::from_millis(10));
        let delay = pacer.next_delay();
        assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(40));
    }

    #[test]
    fn test_pacer_fixed_delay() {
        let pacer = Pacer::new(Duration::from_millis(25), Duration::from_millis(25));
        assert_eq!(pacer.next_delay(), Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_disabled_pacer_never_waits() {
        let pacer = Pacer::disabled();
        assert!(pacer.is_disabled());
        assert_eq!(pacer.pause().await, Duration::ZERO);
        assert_eq!(pacer.cumulative_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pause_accumulates_across_clones() {
        let pacer = Pacer::new(Duration::from_millis(5), Duration::from_millis(5));
        let clone = pacer.clone();
        pacer.pause().await;
        clone.pause().await;
        assert_eq!(pacer.cumulative_delay(), Duration::from_millis(10));
    }

    // ==================== Retry-After Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("  0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("invalid"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_retry_after("3600"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_past() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future_time = std::time::SystemTime::now() + Duration::from_secs(60);
        let future_date = httpdate::fmt_http_date(future_time);

        let duration = parse_retry_after(&future_date).unwrap();
        assert!(duration >= Duration::from_secs(55) && duration <= Duration::from_secs(61));
    }
}
