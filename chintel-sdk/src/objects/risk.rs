//! Risk scoring result types.

use serde::{Deserialize, Serialize};

/// Risk level assigned to an event.
///
/// Levels are ordered, so `level >= RiskLevel::High` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result of scoring a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    /// Score in `[0, 1]`.
    pub score: f64,
    pub level: RiskLevel,
    /// Human-readable reasons that contributed to the score.
    #[serde(default)]
    pub factors: Vec<String>,
}

impl RiskResult {
    /// Build a result, clamping the score into `[0, 1]`.
    pub fn new(score: f64, level: RiskLevel, factors: Vec<String>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            score,
            level,
            factors,
        }
    }
}
