//! Configuration module for chintel-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables, and turns it into the runtime configs
//! `chintel-core` components are built from.

pub mod file;

use crate::config::file::{FileConfig, NotifierSection, RouterSection, ScorerSection};
use chintel_core::config::{
    ChainEndpoint, DiscordConfig, NotifierConfig, ProcessorConfig, QueueConfig,
    ReplaySchedulerConfig, RouterConfig, ScorerConfig, TelegramConfig,
};
use chintel_core::services::NotificationChannel;
use chintel_sdk::objects::RiskLevel;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub queue: QueueConfig,
    pub processor: ProcessorConfig,
    pub scheduler: ReplaySchedulerConfig,
    pub router: RouterConfig,
    pub scorer: ScorerConfig,
    pub notifier: NotifierConfig,
    pub chains: Vec<ChainEndpoint>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides, validate and build the
    /// runtime configuration.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let loaded = build_loaded_config(file_config)?;
        validate(&loaded)?;
        Ok(loaded)
    }
}

fn validate(config: &LoadedConfig) -> Result<(), ConfigError> {
    let mut chain_ids = HashSet::new();
    for chain in &config.chains {
        if !chain_ids.insert(chain.chain_id) {
            return Err(ConfigError::ValidationError(format!(
                "chain {} is configured twice",
                chain.chain_id
            )));
        }
    }
    if let Some(unknown) = config
        .scheduler
        .chains
        .iter()
        .find(|id| !chain_ids.contains(id))
    {
        return Err(ConfigError::ValidationError(format!(
            "scheduler chain {unknown} has no [[chains]] entry"
        )));
    }

    if config.processor.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "processor max_retries must be at least 1".to_string(),
        ));
    }
    if config.queue.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "queue concurrency must be at least 1".to_string(),
        ));
    }
    if config.scheduler.window_blocks == 0 || config.scheduler.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler window_blocks and batch_size must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.router.min_alert_score) {
        return Err(ConfigError::ValidationError(
            "router min_alert_score must be within [0, 1]".to_string(),
        ));
    }

    let scorer = &config.scorer;
    let ordered = 0.0 <= scorer.medium_threshold
        && scorer.medium_threshold <= scorer.high_threshold
        && scorer.high_threshold <= scorer.critical_threshold
        && scorer.critical_threshold <= 1.0;
    if !ordered {
        return Err(ConfigError::ValidationError(
            "scorer thresholds must satisfy 0 <= medium <= high <= critical <= 1".to_string(),
        ));
    }

    let configured = config.notifier.configured_channels();
    for channel in config.router.channels.values().flatten() {
        if !configured.contains(channel) {
            tracing::warn!(%channel, "Routed notification channel is not configured");
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let FileConfig {
        server,
        queue,
        processor,
        scheduler,
        router,
        scorer,
        notifier,
        chains,
    } = file_config;

    let chains: Vec<ChainEndpoint> = chains
        .into_iter()
        .map(|chain| ChainEndpoint {
            chain_id: chain.chain_id,
            rpc_url: chain.rpc_url,
            token_contracts: chain.token_contracts,
            token_decimals: chain.token_decimals,
        })
        .collect();

    let queue_defaults = QueueConfig::default();
    let queue = QueueConfig {
        concurrency: queue.concurrency.unwrap_or(queue_defaults.concurrency),
        timeout: queue
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(queue_defaults.timeout),
    };

    let processor_defaults = ProcessorConfig::default();
    let processor = ProcessorConfig {
        max_retries: processor.max_retries.unwrap_or(processor_defaults.max_retries),
        dedup_window: processor
            .dedup_window_secs
            .map(Duration::from_secs)
            .unwrap_or(processor_defaults.dedup_window),
        retry_base_delay: processor
            .retry_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(processor_defaults.retry_base_delay),
    };

    let scheduler_defaults = ReplaySchedulerConfig::default();
    let scheduler = ReplaySchedulerConfig {
        chains: scheduler
            .chains
            .unwrap_or_else(|| chains.iter().map(|chain| chain.chain_id).collect()),
        window_blocks: scheduler
            .window_blocks
            .unwrap_or(scheduler_defaults.window_blocks),
        batch_size: scheduler.batch_size.unwrap_or(scheduler_defaults.batch_size),
        max_retries: scheduler.max_retries.unwrap_or(scheduler_defaults.max_retries),
        retry_delay: scheduler
            .retry_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(scheduler_defaults.retry_delay),
        tick_interval: scheduler
            .tick_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(scheduler_defaults.tick_interval),
    };

    Ok(LoadedConfig {
        listen: server.listen,
        queue,
        processor,
        scheduler,
        router: convert_router(router)?,
        scorer: convert_scorer(scorer),
        notifier: convert_notifier(notifier),
        chains,
    })
}

fn parse_risk_level(name: &str) -> Result<RiskLevel, ConfigError> {
    match name.to_ascii_uppercase().as_str() {
        "LOW" => Ok(RiskLevel::Low),
        "MEDIUM" => Ok(RiskLevel::Medium),
        "HIGH" => Ok(RiskLevel::High),
        "CRITICAL" => Ok(RiskLevel::Critical),
        _ => Err(ConfigError::ValidationError(format!(
            "unknown risk level in router channels: {name}"
        ))),
    }
}

fn convert_router(section: RouterSection) -> Result<RouterConfig, ConfigError> {
    let mut router = RouterConfig::default();
    if let Some(score) = section.min_alert_score {
        router.min_alert_score = score;
    }
    if let Some(threshold) = section.emergency_value_threshold {
        router.emergency_value_threshold = threshold;
    }
    router.templates.extend(section.templates);
    if let Some(channels) = section.channels {
        router.channels = channels
            .into_iter()
            .map(|(level, channels)| Ok((parse_risk_level(&level)?, channels)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
    }
    Ok(router)
}

fn convert_scorer(section: ScorerSection) -> ScorerConfig {
    let defaults = ScorerConfig::default();
    ScorerConfig {
        amount_low: section.amount_low.unwrap_or(defaults.amount_low),
        amount_medium: section.amount_medium.unwrap_or(defaults.amount_medium),
        amount_high: section.amount_high.unwrap_or(defaults.amount_high),
        blacklist: section.blacklist,
        high_risk_methods: section
            .high_risk_methods
            .unwrap_or(defaults.high_risk_methods),
        medium_threshold: section.medium_threshold.unwrap_or(defaults.medium_threshold),
        high_threshold: section.high_threshold.unwrap_or(defaults.high_threshold),
        critical_threshold: section
            .critical_threshold
            .unwrap_or(defaults.critical_threshold),
        ..defaults
    }
}

fn convert_notifier(section: NotifierSection) -> NotifierConfig {
    let defaults = NotifierConfig::default();
    NotifierConfig {
        telegram: section.telegram.map(|t| TelegramConfig {
            bot_token: t.bot_token,
            chat_id: t.chat_id,
        }),
        discord: section.discord.map(|d| DiscordConfig {
            webhook_url: d.webhook_url,
            username: d.username,
        }),
        webhook: section.webhook_url,
        request_timeout: section
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
