//! Core data models for stockguard
//!
//! Inventory snapshots coming in, per-item stockout predictions going out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One tracked product at a point in time
///
/// Immutable once read from a record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: String,
    pub product_name: String,
    pub stock_quantity: f64,
    /// Sales over the last sales period (30 days by default)
    pub sales_volume: f64,
    /// Reorder threshold ("Reorder_Level")
    pub reorder_level: f64,
    pub reorder_quantity: f64,
    pub last_restock_date: NaiveDate,
    pub supplier_name: String,
}

/// Risk band attached to each prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Elevated => write!(f, "elevated"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Stockout prediction for a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub product_id: String,
    pub product_name: String,
    pub stock_quantity: f64,
    pub sales_volume: f64,
    /// `None` when the product has no sales (infinite runway)
    pub days_until_stockout: Option<f64>,
    pub predicted_probability: f64,
    pub predicted_stockout: bool,
    pub risk_level: RiskLevel,
}
