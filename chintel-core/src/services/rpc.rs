//! EVM JSON-RPC chain provider.
//!
//! Replays ERC-20 `Transfer` logs: fetches them with `eth_getLogs` one batch
//! of blocks at a time, decodes each into a [`TransferEvent`] and pushes it
//! through the [`EventProcessor`], waiting for every event of a batch to
//! settle before moving on.

use crate::config::ChainEndpoint;
use crate::processors::event_processor::{EventProcessor, SubmitOutcome};
use crate::services::chain::{ChainProvider, ProviderError, ReplayCounts};
use async_trait::async_trait;
use chintel_sdk::objects::{EventSource, EventStatus, TransferEvent};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// A raw log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    timestamp: String,
}

pub struct RpcChainProvider {
    endpoints: HashMap<i64, ChainEndpoint>,
    processor: EventProcessor,
    http_client: reqwest::Client,
}

impl RpcChainProvider {
    pub fn new(endpoints: Vec<ChainEndpoint>, processor: EventProcessor) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|endpoint| (endpoint.chain_id, endpoint))
                .collect(),
            processor,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn endpoint(&self, chain_id: i64) -> Result<&ChainEndpoint, ProviderError> {
        self.endpoints
            .get(&chain_id)
            .ok_or(ProviderError::UnknownChain(chain_id))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        url: &Url,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ProviderError> {
        #[derive(Debug, Deserialize)]
        struct RpcErrorBody {
            code: i64,
            message: String,
        }

        #[derive(Debug, Deserialize)]
        struct RpcResponse<T> {
            result: Option<T>,
            error: Option<RpcErrorBody>,
        }

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse<T> = self
            .http_client
            .post(url.as_str())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ProviderError::Malformed(format!("{method} returned no result")))
    }

    async fn get_logs(
        &self,
        endpoint: &ChainEndpoint,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RpcLog>, ProviderError> {
        let mut filter = serde_json::json!({
            "fromBlock": to_hex(from_block),
            "toBlock": to_hex(to_block),
            "topics": [TRANSFER_TOPIC],
        });
        if !endpoint.token_contracts.is_empty() {
            filter["address"] = serde_json::json!(endpoint.token_contracts);
        }
        self.call(&endpoint.rpc_url, "eth_getLogs", serde_json::json!([filter]))
            .await
    }

    async fn block_timestamp(
        &self,
        endpoint: &ChainEndpoint,
        block_number: u64,
    ) -> Result<i64, ProviderError> {
        let block: RpcBlock = self
            .call(
                &endpoint.rpc_url,
                "eth_getBlockByNumber",
                serde_json::json!([to_hex(block_number), false]),
            )
            .await?;
        let timestamp = parse_hex_u64(&block.timestamp)?;
        i64::try_from(timestamp)
            .map_err(|_| ProviderError::Malformed(format!("timestamp {timestamp} out of range")))
    }

    async fn replay_batch(
        &self,
        endpoint: &ChainEndpoint,
        from_block: u64,
        to_block: u64,
    ) -> Result<ReplayCounts, ProviderError> {
        let logs = self.get_logs(endpoint, from_block, to_block).await?;
        let mut counts = ReplayCounts::default();
        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        let mut handles = Vec::new();
        let mut duplicates = 0u64;

        for log in &logs {
            let mut event = match decode_transfer_log(endpoint.chain_id, log, endpoint.token_decimals) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        chain_id = endpoint.chain_id,
                        tx_hash = %log.transaction_hash,
                        error = %e,
                        "Skipping undecodable log"
                    );
                    counts.failed += 1;
                    continue;
                }
            };

            if let Some(block) = event.block_number.and_then(|b| u64::try_from(b).ok()) {
                let timestamp = match timestamps.get(&block) {
                    Some(timestamp) => *timestamp,
                    None => {
                        let timestamp = self.block_timestamp(endpoint, block).await?;
                        timestamps.insert(block, timestamp);
                        timestamp
                    }
                };
                event.timestamp = timestamp;
            }

            match self.processor.submit(event) {
                SubmitOutcome::Duplicate => duplicates += 1,
                SubmitOutcome::Enqueued(handle) => handles.push(self.processor.drive(handle)),
            }
        }

        for event in join_all(handles).await {
            if event.status == EventStatus::Success {
                counts.processed += 1;
            } else {
                counts.failed += 1;
            }
        }

        debug!(
            chain_id = endpoint.chain_id,
            from_block,
            to_block,
            logs = logs.len(),
            duplicates,
            processed = counts.processed,
            failed = counts.failed,
            "Replayed block batch"
        );
        Ok(counts)
    }
}

#[async_trait]
impl ChainProvider for RpcChainProvider {
    async fn current_block_height(&self, chain_id: i64) -> Result<u64, ProviderError> {
        let endpoint = self.endpoint(chain_id)?;
        let height: String = self
            .call(&endpoint.rpc_url, "eth_blockNumber", serde_json::json!([]))
            .await?;
        parse_hex_u64(&height)
    }

    async fn replay(
        &self,
        chain_id: i64,
        start_block: u64,
        end_block: u64,
        batch_size: u64,
    ) -> Result<ReplayCounts, ProviderError> {
        let endpoint = self.endpoint(chain_id)?;
        let batch_size = batch_size.max(1);
        let mut counts = ReplayCounts::default();

        let mut from_block = start_block;
        while from_block <= end_block {
            let to_block = from_block.saturating_add(batch_size - 1).min(end_block);
            counts += self.replay_batch(endpoint, from_block, to_block).await?;
            from_block = to_block + 1;
        }

        info!(
            chain_id,
            start_block,
            end_block,
            processed = counts.processed,
            failed = counts.failed,
            "Block range replayed"
        );
        Ok(counts)
    }
}

fn to_hex(value: u64) -> String {
    format!("{value:#x}")
}

fn parse_hex_u64(value: &str) -> Result<u64, ProviderError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::Malformed(format!("invalid quantity {value:?}: {e}")))
}

/// Last 20 bytes of a 32-byte topic, as a `0x` address.
fn topic_to_address(topic: &str) -> Result<String, ProviderError> {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProviderError::Malformed(format!("invalid address topic {topic:?}")));
    }
    Ok(format!("0x{}", digits[24..].to_lowercase()))
}

/// Convert a 32-byte big-endian amount into token units.
fn decode_amount(data: &str, decimals: u32) -> Result<Decimal, ProviderError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let raw = u128::from_str_radix(significant, 16)
        .map_err(|e| ProviderError::Malformed(format!("invalid amount {data:?}: {e}")))?;
    let raw = i128::try_from(raw)
        .map_err(|_| ProviderError::Malformed(format!("amount {data:?} out of range")))?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|value| value.normalize())
        .map_err(|e| ProviderError::Malformed(format!("amount {data:?}: {e}")))
}

/// Decode an ERC-20 `Transfer` log into a replay event.
pub fn decode_transfer_log(
    chain_id: i64,
    log: &RpcLog,
    decimals: u32,
) -> Result<TransferEvent, ProviderError> {
    let [topic, from, to] = log.topics.as_slice() else {
        return Err(ProviderError::Malformed(format!(
            "expected 3 topics, got {}",
            log.topics.len()
        )));
    };
    if !topic.eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return Err(ProviderError::Malformed(format!("not a Transfer log: {topic}")));
    }

    let block_number = parse_hex_u64(&log.block_number)?;
    let value = decode_amount(&log.data, decimals)?;

    let mut event = TransferEvent::new(
        chain_id,
        log.transaction_hash.to_lowercase(),
        topic_to_address(from)?,
        topic_to_address(to)?,
        value.to_string(),
        0,
    );
    event.block_number = i64::try_from(block_number).ok();
    event.source = EventSource::Replay;
    Ok(event)
}
