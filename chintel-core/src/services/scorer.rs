//! Risk scoring.

use crate::config::{ScorerConfig, TRANSFER_METHOD};
use async_trait::async_trait;
use chintel_sdk::objects::{RiskLevel, RiskResult, TransferEvent};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Scoring failed. Never retried: the same input fails the same way.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The event value is not a non-negative decimal
    #[error("invalid event value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },

    /// The scoring backend failed
    #[error("scoring failed: {0}")]
    Model(String),
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, event: &TransferEvent) -> Result<RiskResult, AnalysisError>;
}

/// Weighted rule-based scorer.
///
/// Combines an amount tier, the contract method and the batch flag, then
/// lifts the score to a floor when either side is blacklisted.
pub struct HeuristicScorer {
    config: ScorerConfig,
    blacklist: Vec<String>,
}

impl HeuristicScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let blacklist = config
            .blacklist
            .iter()
            .map(|address| address.to_lowercase())
            .collect();
        Self { config, blacklist }
    }

    fn amount_score(&self, value: Decimal) -> f64 {
        if value <= self.config.amount_low {
            0.0
        } else if value <= self.config.amount_medium {
            0.5
        } else if value <= self.config.amount_high {
            0.8
        } else {
            1.0
        }
    }

    fn contract_score(&self, method: Option<&str>) -> f64 {
        match method {
            None | Some(TRANSFER_METHOD) => 0.0,
            Some(method) if self.config.high_risk_methods.iter().any(|m| m == method) => 1.0,
            Some(_) => 0.5,
        }
    }

    fn is_blacklisted(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.blacklist.contains(&address)
    }

    fn level_for(&self, score: f64) -> RiskLevel {
        if score >= self.config.critical_threshold {
            RiskLevel::Critical
        } else if score >= self.config.high_threshold {
            RiskLevel::High
        } else if score >= self.config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn evaluate(&self, event: &TransferEvent) -> Result<RiskResult, AnalysisError> {
        let value = Decimal::from_str(event.value.trim()).map_err(|e| {
            AnalysisError::InvalidValue {
                value: event.value.clone(),
                reason: e.to_string(),
            }
        })?;
        if value.is_sign_negative() {
            return Err(AnalysisError::InvalidValue {
                value: event.value.clone(),
                reason: "negative amount".to_string(),
            });
        }

        let mut factors = Vec::new();

        let amount = self.amount_score(value);
        if amount > 0.0 {
            factors.push(format!("amount {value} above {}", self.config.amount_low));
        }

        let method = event.method.as_deref();
        let contract = self.contract_score(method);
        if let Some(method) = method.filter(|_| contract > 0.0) {
            factors.push(format!("contract method {method}"));
        }

        let batch = if event.batch_operation { 1.0 } else { 0.0 };
        if event.batch_operation {
            factors.push("batch operation".to_string());
        }

        let mut score = self.config.amount_weight * amount
            + self.config.contract_weight * contract
            + self.config.batch_weight * batch;

        for (side, address) in [("sender", &event.from), ("receiver", &event.to)] {
            if self.is_blacklisted(address) {
                factors.push(format!("blacklisted {side} {address}"));
                score = score.max(self.config.blacklist_floor);
            }
        }

        let result = RiskResult::new(score, RiskLevel::Low, factors);
        Ok(RiskResult {
            level: self.level_for(result.score),
            ..result
        })
    }
}

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn score(&self, event: &TransferEvent) -> Result<RiskResult, AnalysisError> {
        self.evaluate(event)
    }
}
