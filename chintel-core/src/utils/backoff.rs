use std::time::Duration;

/// Largest exponent applied to the base delay (2^11 = 2048x).
pub const MAX_BACKOFF_EXPONENT: u32 = 11;

/// Delay before re-submitting an event that failed `retry_count` times.
///
/// Exponential backoff: `base * 2^(retry_count - 1)`, capped at
/// `base * 2^MAX_BACKOFF_EXPONENT`.
pub fn calculate_retry_delay(base: Duration, retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2u32.pow(exponent))
}
