//! TOML file configuration structures.
//!
//! These structs directly map to the `chintel-config.toml` file format.
//! Every section may be omitted; missing fields fall back
//! to the defaults of the matching runtime config in `chintel-core`.

use chintel_core::services::NotificationChannel;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub processor: ProcessorSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub scorer: ScorerSection,
    #[serde(default)]
    pub notifier: NotifierSection,
    #[serde(default)]
    pub chains: Vec<ChainSection>,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSection {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorSection {
    pub max_retries: Option<u32>,
    pub dedup_window_secs: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerSection {
    /// Chains to replay. Defaults to every chain listed under `[[chains]]`.
    pub chains: Option<Vec<i64>>,
    pub window_blocks: Option<u64>,
    pub batch_size: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub tick_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterSection {
    pub min_alert_score: Option<f64>,
    pub emergency_value_threshold: Option<Decimal>,
    /// Extra or replacement templates keyed by method name.
    #[serde(default)]
    pub templates: HashMap<String, String>,
    /// Channels per risk level name (`HIGH`, `CRITICAL`, ...). Replaces the
    /// default channel map when present.
    pub channels: Option<HashMap<String, Vec<NotificationChannel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScorerSection {
    pub amount_low: Option<Decimal>,
    pub amount_medium: Option<Decimal>,
    pub amount_high: Option<Decimal>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    pub high_risk_methods: Option<Vec<String>>,
    pub medium_threshold: Option<f64>,
    pub high_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierSection {
    pub request_timeout_secs: Option<u64>,
    pub telegram: Option<TelegramSection>,
    pub discord: Option<DiscordSection>,
    pub webhook_url: Option<Url>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSection {
    pub webhook_url: Url,
    #[serde(default = "default_discord_username")]
    pub username: String,
}

fn default_discord_username() -> String {
    "ChainIntel".to_string()
}

/// One `[[chains]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    pub chain_id: i64,
    pub rpc_url: Url,
    #[serde(default)]
    pub token_contracts: Vec<String>,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
}

fn default_token_decimals() -> u32 {
    18
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[queue]
concurrency = 4
timeout_secs = 10

[processor]
max_retries = 5

[scheduler]
window_blocks = 600
tick_interval_secs = 1800

[router]
min_alert_score = 0.5
emergency_value_threshold = "250.5"

[router.templates]
mint = "minted {{value}}"

[router.channels]
HIGH = ["webhook"]
CRITICAL = ["telegram", "discord", "webhook"]

[scorer]
blacklist = ["0xBAD"]
amount_high = "50"

[notifier.telegram]
bot_token = "123:abc"
chat_id = "-100"

[notifier.discord]
webhook_url = "https://discord.com/api/webhooks/1/x"

[[chains]]
chain_id = 1
rpc_url = "https://eth.example.com"
token_contracts = ["0xdAC17F958D2ee523a2206206994597C13D831ec7"]
token_decimals = 6

[[chains]]
chain_id = 56
rpc_url = "https://bsc.example.com"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.queue.concurrency, Some(4));
        assert_eq!(config.processor.max_retries, Some(5));
        assert_eq!(config.processor.dedup_window_secs, None);
        assert_eq!(config.scheduler.window_blocks, Some(600));
        assert_eq!(
            config.router.emergency_value_threshold,
            Some(Decimal::new(2505, 1))
        );
        assert_eq!(config.router.templates["mint"], "minted {{value}}");
        let channels = config.router.channels.unwrap();
        assert_eq!(channels["HIGH"], vec![NotificationChannel::Webhook]);
        assert_eq!(channels["CRITICAL"].len(), 3);
        assert_eq!(config.scorer.amount_high, Some(Decimal::from(50)));
        assert_eq!(config.notifier.discord.unwrap().username, "ChainIntel");
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].token_decimals, 6);
        assert_eq!(config.chains[1].token_decimals, 18);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert!(config.chains.is_empty());
        assert!(config.notifier.telegram.is_none());
    }
}
