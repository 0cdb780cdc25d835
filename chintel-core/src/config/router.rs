//! Notification routing configuration.

use crate::services::notifier::NotificationChannel;
use chintel_sdk::objects::RiskLevel;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Method name plain transfers resolve to.
pub const TRANSFER_METHOD: &str = "transfer";

const TRANSFER_TEMPLATE: &str = "[{{riskLevel}}] Transfer on chain {{chainId}}\n\
Value: {{value}}\n\
From: {{from}}\n\
To: {{to}}\n\
Tx: {{txHash}}\n\
Score: {{score}} ({{factors}})";

const CONTRACT_TEMPLATE: &str = "[{{riskLevel}}] Contract call {{method}} on chain {{chainId}}\n\
Value: {{value}}\n\
From: {{from}}\n\
Contract: {{to}}\n\
Tx: {{txHash}}\n\
Score: {{score}} ({{factors}})";

/// Configuration for the [`NotificationRouter`](crate::notification::NotificationRouter).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Scores below this never alert.
    pub min_alert_score: f64,
    /// Values above this (native-token units) are tagged as emergencies.
    pub emergency_value_threshold: Decimal,
    /// Notification templates keyed by resolved method name.
    pub templates: HashMap<String, String>,
    /// Channels alerted for each risk level.
    pub channels: HashMap<RiskLevel, Vec<NotificationChannel>>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let templates = [
            (TRANSFER_METHOD, TRANSFER_TEMPLATE),
            ("transferFrom", CONTRACT_TEMPLATE),
            ("approve", CONTRACT_TEMPLATE),
            ("setApprovalForAll", CONTRACT_TEMPLATE),
            ("swap", CONTRACT_TEMPLATE),
        ]
        .into_iter()
        .map(|(method, template)| (method.to_string(), template.to_string()))
        .collect();

        let channels = HashMap::from([
            (RiskLevel::High, vec![NotificationChannel::Telegram]),
            (
                RiskLevel::Critical,
                vec![NotificationChannel::Telegram, NotificationChannel::Discord],
            ),
        ]);

        Self {
            min_alert_score: 0.3,
            emergency_value_threshold: Decimal::from(100),
            templates,
            channels,
        }
    }
}
