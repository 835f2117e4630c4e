//! Decision thresholds and risk bands
//!
//! The decision threshold turns a probability into a stockout flag; it is a
//! parameter rather than a constant so operators can trade precision for
//! recall. Lowering it flags more at-risk items.

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::models::RiskLevel;
use serde::{Deserialize, Serialize};

/// Thresholds applied to predicted stockout probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// A probability strictly above this is a predicted stockout
    pub threshold: f64,
    /// Probability at or above which an item is high risk
    pub high_risk_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            high_risk_threshold: 0.8,
        }
    }
}

impl ThresholdConfig {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        check_threshold(self.threshold)?;
        check_threshold(self.high_risk_threshold)
    }

    /// Predicted stockout flag
    pub fn is_stockout(&self, probability: f64) -> bool {
        probability > self.threshold
    }

    pub fn risk_level(&self, probability: f64) -> RiskLevel {
        if probability >= self.high_risk_threshold && self.is_stockout(probability) {
            RiskLevel::High
        } else if self.is_stockout(probability) {
            RiskLevel::Elevated
        } else {
            RiskLevel::Low
        }
    }
}

pub fn check_threshold(threshold: f64) -> PipelineResult<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(PipelineError::data(
            Stage::Evaluate,
            format!("threshold must be within [0, 1], got {threshold}"),
        ))
    }
}
