//! Exponential backoff with jitter between conflict retries.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is the retry number (1 for the first retry). A `base_ms` of 0
/// disables the pause entirely.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Jitter over the upper half of the capped delay.
    let floor = capped_delay / 2;
    let jitter = if capped_delay > floor {
        rand::thread_rng().gen_range(0..=capped_delay - floor)
    } else {
        0
    };

    Duration::from_millis(floor + jitter)
}
