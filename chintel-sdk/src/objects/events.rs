//! Ingested blockchain event types.

use serde::{Deserialize, Serialize};

use super::risk::RiskResult;

/// Processing status of an ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    AiFailed,
}

impl EventStatus {
    /// Whether no further automatic transition happens from this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Success | EventStatus::Failed | EventStatus::AiFailed
        )
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "pending"),
            EventStatus::Processing => write!(f, "processing"),
            EventStatus::Success => write!(f, "success"),
            EventStatus::Failed => write!(f, "failed"),
            EventStatus::AiFailed => write!(f, "ai_failed"),
        }
    }
}

/// Where an event entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Live,
    Replay,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::Live => write!(f, "live"),
            EventSource::Replay => write!(f, "replay"),
        }
    }
}

/// A transfer or contract-call event observed on chain.
///
/// `value` is a decimal string in native-token units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub chain_id: i64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub block_number: Option<i64>,
    /// Resolved contract method name, `None` for plain transfers.
    #[serde(default)]
    pub method: Option<String>,
    /// Part of a batch operation whose alerts are aggregated elsewhere.
    #[serde(default)]
    pub batch_operation: bool,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub risk_result: Option<RiskResult>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl TransferEvent {
    /// Create a fresh live event in `pending` status.
    pub fn new(
        chain_id: i64,
        tx_hash: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            chain_id,
            tx_hash: tx_hash.into(),
            from: from.into(),
            to: to.into(),
            value: value.into(),
            timestamp,
            block_number: None,
            method: None,
            batch_operation: false,
            source: EventSource::Live,
            status: EventStatus::Pending,
            retry_count: 0,
            risk_result: None,
            last_error: None,
        }
    }
}

/// Answer to `POST /events`: the event was handed to the ingest pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    pub tx_hash: String,
}
