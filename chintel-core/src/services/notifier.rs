//! Alert delivery.
//!
//! [`Notifier`] is the seam the event processor sends alerts through.
//! [`HttpNotifier`] delivers them to Telegram, Discord or a generic JSON
//! webhook.

use crate::config::NotifierConfig;
use async_trait::async_trait;
use chintel_sdk::objects::{RiskResult, TransferEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Telegram rejects messages longer than this.
const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// A destination an alert can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Telegram,
    Discord,
    Webhook,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Telegram => write!(f, "telegram"),
            NotificationChannel::Discord => write!(f, "discord"),
            NotificationChannel::Webhook => write!(f, "webhook"),
        }
    }
}

/// Errors that can occur while delivering an alert.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("{channel} delivery failed with status {status}: {body}")]
    DeliveryFailed {
        channel: NotificationChannel,
        status: u16,
        body: String,
    },

    /// Routed to a channel that has no configuration
    #[error("channel {0} is not configured")]
    NotConfigured(NotificationChannel),

    /// Transport rejected the message for another reason
    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver rendered alert content for `event` to one channel.
    async fn send(
        &self,
        channel: NotificationChannel,
        event: &TransferEvent,
        risk: &RiskResult,
        content: &str,
    ) -> Result<(), TransportError>;
}

/// Body posted to the generic webhook channel.
#[derive(Debug, Serialize)]
struct WebhookAlert<'a> {
    event: &'a TransferEvent,
    risk: &'a RiskResult,
    content: &'a str,
}

/// [`Notifier`] over HTTP.
pub struct HttpNotifier {
    config: NotifierConfig,
    http_client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    /// Channels that have enough configuration to be delivered to.
    pub fn configured_channels(&self) -> Vec<NotificationChannel> {
        self.config.configured_channels()
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        channel: NotificationChannel,
        url: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        let response = self.http_client.post(url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(channel = %channel, "Alert delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::DeliveryFailed {
                channel,
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn truncate_chars(content: &str, max: usize) -> &str {
    match content.char_indices().nth(max) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        event: &TransferEvent,
        risk: &RiskResult,
        content: &str,
    ) -> Result<(), TransportError> {
        match channel {
            NotificationChannel::Telegram => {
                let Some(telegram) = &self.config.telegram else {
                    return Err(TransportError::NotConfigured(channel));
                };
                let url = format!("{TELEGRAM_API_URL}/bot{}/sendMessage", telegram.bot_token);
                let body = serde_json::json!({
                    "chat_id": telegram.chat_id,
                    "text": truncate_chars(content, TELEGRAM_MAX_MESSAGE_LEN),
                    "disable_web_page_preview": true,
                });
                self.post_json(channel, &url, &body).await
            }
            NotificationChannel::Discord => {
                let Some(discord) = &self.config.discord else {
                    return Err(TransportError::NotConfigured(channel));
                };
                let body = serde_json::json!({
                    "content": content,
                    "username": discord.username,
                });
                self.post_json(channel, discord.webhook_url.as_str(), &body)
                    .await
            }
            NotificationChannel::Webhook => {
                let Some(url) = &self.config.webhook else {
                    return Err(TransportError::NotConfigured(channel));
                };
                let body = WebhookAlert {
                    event,
                    risk,
                    content,
                };
                self.post_json(channel, url.as_str(), &body).await
            }
        }
    }
}
