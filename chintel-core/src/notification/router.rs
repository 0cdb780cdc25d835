use super::template::render_template;
use crate::config::{RouterConfig, TRANSFER_METHOD};
use crate::services::notifier::NotificationChannel;
use chintel_sdk::objects::{RiskResult, TransferEvent};
use itertools::Itertools;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Method name used when an event's method has no template.
pub const UNKNOWN_METHOD: &str = "unknown_method";

/// Why an alert was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Batch operations are aggregated elsewhere.
    BatchCached,
    NoTemplate,
    /// Score below the alert threshold, or no channel for the level.
    NoRecipients,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::BatchCached => "batch_cached",
            SkipReason::NoTemplate => "no_template",
            SkipReason::NoRecipients => "no_recipients",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered alert ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channels: Vec<NotificationChannel>,
    pub content: String,
    /// Value above the emergency threshold. Observability only.
    pub emergency: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Skip(SkipReason),
    Send(Notification),
}

/// Pure routing policy over [`RouterConfig`].
#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    config: RouterConfig,
}

impl NotificationRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Template key for the event: its method, `transfer` when it has none,
    /// [`UNKNOWN_METHOD`] when no template exists for it.
    pub fn resolve_method<'a>(&self, event: &'a TransferEvent) -> &'a str {
        let method = event.method.as_deref().unwrap_or(TRANSFER_METHOD);
        if self.config.templates.contains_key(method) {
            method
        } else {
            UNKNOWN_METHOD
        }
    }

    pub fn decide(&self, event: &TransferEvent, risk: &RiskResult) -> RouteDecision {
        if event.batch_operation {
            return RouteDecision::Skip(SkipReason::BatchCached);
        }

        let method = self.resolve_method(event);
        let Some(template) = self
            .config
            .templates
            .get(method)
            .filter(|_| method != UNKNOWN_METHOD)
        else {
            return RouteDecision::Skip(SkipReason::NoTemplate);
        };

        if risk.score < self.config.min_alert_score {
            return RouteDecision::Skip(SkipReason::NoRecipients);
        }

        let channels = self
            .config
            .channels
            .get(&risk.level)
            .cloned()
            .unwrap_or_default();
        if channels.is_empty() {
            return RouteDecision::Skip(SkipReason::NoRecipients);
        }

        RouteDecision::Send(Notification {
            channels,
            content: render_template(template, &template_vars(event, risk, method)),
            emergency: self.is_emergency(event),
        })
    }

    fn is_emergency(&self, event: &TransferEvent) -> bool {
        Decimal::from_str(event.value.trim())
            .map(|value| value > self.config.emergency_value_threshold)
            .unwrap_or(false)
    }
}

fn template_vars(event: &TransferEvent, risk: &RiskResult, method: &str) -> Vec<(&'static str, String)> {
    let factors = if risk.factors.is_empty() {
        "none".to_string()
    } else {
        risk.factors.iter().join(", ")
    };
    vec![
        ("riskLevel", risk.level.to_string()),
        ("score", format!("{:.2}", risk.score)),
        ("factors", factors),
        ("chainId", event.chain_id.to_string()),
        ("txHash", event.tx_hash.clone()),
        ("from", event.from.clone()),
        ("to", event.to.clone()),
        ("value", event.value.clone()),
        ("method", method.to_string()),
        ("timestamp", event.timestamp.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chintel_sdk::objects::RiskLevel;

    fn event() -> TransferEvent {
        TransferEvent::new(1, "0xabc", "0xfrom", "0xto", "2.5", 1_700_000_000)
    }

    fn high(score: f64) -> RiskResult {
        RiskResult::new(score, RiskLevel::High, vec!["large amount".to_string()])
    }

    #[test]
    fn test_batch_operation_is_cached() {
        let router = NotificationRouter::default();
        let mut event = event();
        event.batch_operation = true;
        assert_eq!(
            router.decide(&event, &high(0.9)),
            RouteDecision::Skip(SkipReason::BatchCached)
        );
    }

    #[test]
    fn test_unknown_method_has_no_template() {
        let router = NotificationRouter::default();
        let mut event = event();
        event.method = Some("multicall".to_string());
        assert_eq!(router.resolve_method(&event), UNKNOWN_METHOD);
        assert_eq!(
            router.decide(&event, &high(0.9)),
            RouteDecision::Skip(SkipReason::NoTemplate)
        );
    }

    #[test]
    fn test_low_score_has_no_recipients() {
        let router = NotificationRouter::default();
        assert_eq!(
            router.decide(&event(), &high(0.2)),
            RouteDecision::Skip(SkipReason::NoRecipients)
        );
    }

    #[test]
    fn test_level_without_channels_has_no_recipients() {
        let router = NotificationRouter::default();
        let medium = RiskResult::new(0.5, RiskLevel::Medium, vec![]);
        assert_eq!(
            router.decide(&event(), &medium),
            RouteDecision::Skip(SkipReason::NoRecipients)
        );
    }

    #[test]
    fn test_plain_transfer_renders_template() {
        let router = NotificationRouter::default();
        let RouteDecision::Send(notification) = router.decide(&event(), &high(0.8)) else {
            panic!("expected a notification");
        };
        assert_eq!(notification.channels, vec![NotificationChannel::Telegram]);
        assert!(!notification.emergency);
        assert!(notification.content.starts_with("[HIGH] Transfer on chain 1"));
        assert!(notification.content.contains("Tx: 0xabc"));
        assert!(notification.content.contains("Score: 0.80 (large amount)"));
        assert!(!notification.content.contains("{{"));
    }

    #[test]
    fn test_critical_routes_to_all_configured_channels() {
        let router = NotificationRouter::default();
        let mut event = event();
        event.method = Some("approve".to_string());
        let critical = RiskResult::new(0.95, RiskLevel::Critical, vec![]);
        let RouteDecision::Send(notification) = router.decide(&event, &critical) else {
            panic!("expected a notification");
        };
        assert_eq!(
            notification.channels,
            vec![NotificationChannel::Telegram, NotificationChannel::Discord]
        );
        assert!(notification.content.contains("Contract call approve"));
    }

    #[test]
    fn test_emergency_above_value_threshold() {
        let router = NotificationRouter::default();
        let mut event = event();
        event.value = "100.5".to_string();
        let RouteDecision::Send(notification) = router.decide(&event, &high(0.8)) else {
            panic!("expected a notification");
        };
        assert!(notification.emergency);

        event.value = "100".to_string();
        let RouteDecision::Send(notification) = router.decide(&event, &high(0.8)) else {
            panic!("expected a notification");
        };
        assert!(!notification.emergency);
    }
}
