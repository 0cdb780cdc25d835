//! Work queue configuration.

use std::time::Duration;

/// Configuration for the [`WorkQueue`](crate::queue::WorkQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of simultaneously running tasks.
    pub concurrency: usize,
    /// Wall-clock budget per task.
    pub timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: Duration::from_secs(30),
        }
    }
}
