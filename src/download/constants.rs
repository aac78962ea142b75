//! Constants for the download module (limits, pacing, staging).

use std::time::Duration;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 20;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default lower bound of the pacing delay.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound of the pacing delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1500);

/// Largest accepted pacing bound.
pub const MAX_PACING_DELAY: Duration = Duration::from_secs(60);

/// Accepted range for the total attempt count.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Warning threshold for cumulative pacing delay in a run (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Grace period for in-flight units after an interrupt.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Poll interval of the interrupt flag while waiting for a permit.
pub const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Hidden directory under the destination root holding partial downloads.
pub const STAGING_DIR: &str = ".staging";
