//! Event processor configuration.

use std::time::Duration;

/// Configuration for the [`EventProcessor`](crate::processors::EventProcessor).
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Attempts allowed before an event becomes terminally `failed`.
    pub max_retries: u32,
    /// How long a fingerprint is remembered for deduplication.
    pub dedup_window: Duration,
    /// Base delay for the exponential backoff between retries.
    pub retry_base_delay: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            dedup_window: Duration::from_secs(60 * 60),
            retry_base_delay: Duration::from_secs(1),
        }
    }
}
