//! Replay job request and response types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Replay job status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `chintel-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A replay job record as exposed to dashboards and CLIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayJobResponse {
    pub id: Uuid,
    pub chain_id: i64,
    pub start_block: i64,
    pub end_block: i64,
    pub status: JobStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub processed_events: i64,
    pub failed_events: i64,
    /// Seconds.
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub retry_count: i32,
}

/// Aggregates over all jobs sharing a status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusStats {
    pub count: i64,
    pub avg_duration: Option<f64>,
    pub total_processed: i64,
    pub total_failed: i64,
}

/// Job aggregates keyed by status, as returned by `GET /replay/stats`.
pub type JobStatsResponse = BTreeMap<JobStatus, JobStatusStats>;

/// Answer to `POST /replay/tick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickAccepted {
    pub started: bool,
}

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 200;

/// Query parameters for listing recent jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl ListJobsQuery {
    /// Limit clamped to a safe range.
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT) as usize
    }
}
