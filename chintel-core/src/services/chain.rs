//! Chain access for the replay scheduler.

use async_trait::async_trait;
use thiserror::Error;

/// Result of replaying one block range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCounts {
    /// Events that reached `success`.
    pub processed: u64,
    /// Events that ended `failed` or `ai_failed`, or could not be decoded.
    pub failed: u64,
}

impl std::ops::AddAssign for ReplayCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.failed += rhs.failed;
    }
}

/// Errors that can occur while talking to a chain.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Node returned a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Node response could not be interpreted
    #[error("malformed RPC response: {0}")]
    Malformed(String),

    /// No endpoint configured for the chain
    #[error("no RPC endpoint configured for chain {0}")]
    UnknownChain(i64),
}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Latest block number of the chain.
    async fn current_block_height(&self, chain_id: i64) -> Result<u64, ProviderError>;

    /// Re-ingest every event in `start_block..=end_block`, `batch_size`
    /// blocks at a time, and report how they ended.
    async fn replay(
        &self,
        chain_id: i64,
        start_block: u64,
        end_block: u64,
        batch_size: u64,
    ) -> Result<ReplayCounts, ProviderError>;
}
