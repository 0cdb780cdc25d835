//! Notification transport configuration.

use crate::services::notifier::NotificationChannel;
use std::time::Duration;
use url::Url;

/// Telegram bot credentials.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Discord incoming webhook.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: Url,
    pub username: String,
}

/// Configuration for the [`HttpNotifier`](crate::services::notifier::HttpNotifier).
///
/// A channel without configuration fails to send, so routing to it is
/// reported as a transport error rather than silently dropped.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    /// Generic JSON webhook endpoint.
    pub webhook: Option<Url>,
    pub request_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            discord: None,
            webhook: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl NotifierConfig {
    /// Channels that have enough configuration to be delivered to.
    pub fn configured_channels(&self) -> Vec<NotificationChannel> {
        [
            (NotificationChannel::Telegram, self.telegram.is_some()),
            (NotificationChannel::Discord, self.discord.is_some()),
            (NotificationChannel::Webhook, self.webhook.is_some()),
        ]
        .into_iter()
        .filter_map(|(channel, configured)| configured.then_some(channel))
        .collect()
    }
}
