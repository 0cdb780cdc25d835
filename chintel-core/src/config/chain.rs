//! Chain provider configuration.

use url::Url;

/// JSON-RPC endpoint of a single EVM chain.
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub chain_id: i64,
    pub rpc_url: Url,
    /// ERC-20 contracts whose `Transfer` logs are replayed.
    /// Empty means all contracts.
    pub token_contracts: Vec<String>,
    /// Decimals used to convert raw log values to token units.
    pub token_decimals: u32,
}
