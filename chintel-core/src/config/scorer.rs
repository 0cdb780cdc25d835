//! Heuristic scorer configuration.

use rust_decimal::Decimal;

/// Tunables for the [`HeuristicScorer`](crate::services::scorer::HeuristicScorer).
///
/// Weights are deployment configuration; the defaults are a starting point.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Amount tiers in native-token units: `<= low` scores 0,
    /// `<= medium` 0.5, `<= high` 0.8, above 1.0.
    pub amount_low: Decimal,
    pub amount_medium: Decimal,
    pub amount_high: Decimal,
    /// Lower-cased addresses that always score high.
    pub blacklist: Vec<String>,
    /// Contract methods considered dangerous.
    pub high_risk_methods: Vec<String>,
    pub amount_weight: f64,
    pub contract_weight: f64,
    pub batch_weight: f64,
    /// Score floor applied when either side is blacklisted.
    pub blacklist_floor: f64,
    /// Level thresholds on the final score.
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            amount_low: Decimal::new(1, 1),
            amount_medium: Decimal::from(1),
            amount_high: Decimal::from(10),
            blacklist: Vec::new(),
            high_risk_methods: vec![
                "approve".to_string(),
                "setApprovalForAll".to_string(),
                "transferOwnership".to_string(),
                "upgradeTo".to_string(),
            ],
            amount_weight: 0.6,
            contract_weight: 0.3,
            batch_weight: 0.1,
            blacklist_floor: 0.9,
            medium_threshold: 0.4,
            high_threshold: 0.6,
            critical_threshold: 0.9,
        }
    }
}
