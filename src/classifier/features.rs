//! Feature derivation for stockout classification
//!
//! Turns raw inventory records into the six-feature vectors the classifier
//! consumes, plus the binary stockout label.
//!
//! A record with zero sales never runs out: its `days_until_stockout` is
//! `None`, its label is "no stockout", and the feature vector encodes the
//! runway as `runway_cap_days`.

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::models::InventoryRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of features per record
pub const FEATURE_COUNT: usize = 6;

/// Feature order shared by training and inference
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "stock_quantity",
    "sales_volume",
    "days_until_stockout",
    "reorder_level",
    "lead_time_days",
    "rolling_avg_sales",
];

/// Feature vector for a record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

/// Derivation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Trailing window for the rolling sales average
    pub rolling_window: usize,
    /// Runway at or below which a record is labelled a stockout
    pub stockout_horizon_days: f64,
    /// Number of days `sales_volume` covers
    pub sales_period_days: f64,
    /// Upper bound on the runway feature; also stands in for "no sales"
    pub runway_cap_days: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_window: 7,
            stockout_horizon_days: 7.0,
            sales_period_days: 30.0,
            runway_cap_days: 365.0,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.rolling_window == 0 {
            return Err(PipelineError::data(Stage::Derive, "rolling_window must be at least 1"));
        }
        if !(self.sales_period_days.is_finite() && self.sales_period_days > 0.0) {
            return Err(PipelineError::data(Stage::Derive, "sales_period_days must be positive"));
        }
        if !(self.stockout_horizon_days.is_finite() && self.stockout_horizon_days >= 0.0) {
            return Err(PipelineError::data(
                Stage::Derive,
                "stockout_horizon_days must be non-negative",
            ));
        }
        if !(self.runway_cap_days.is_finite() && self.runway_cap_days > 0.0) {
            return Err(PipelineError::data(Stage::Derive, "runway_cap_days must be positive"));
        }
        Ok(())
    }
}

/// Inventory record plus its derived signals
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub record: InventoryRecord,
    /// `None` when `sales_volume == 0`
    pub days_until_stockout: Option<f64>,
    pub label_stockout: bool,
    pub rolling_avg_sales: f64,
    pub lead_time_days: i64,
    pub features: FeatureVector,
}

/// Runway in days at the current sales rate, `None` without sales
pub fn days_until_stockout(stock: f64, sales_volume: f64, sales_period_days: f64) -> Option<f64> {
    if sales_volume == 0.0 {
        None
    } else {
        Some(stock / (sales_volume / sales_period_days))
    }
}

/// Left-aligned trailing mean; the first `window - 1` values use the
/// shorter history available.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut sum = 0.0;
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

/// Derives features and labels relative to a fixed reference date
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    config: FeatureConfig,
    as_of: NaiveDate,
}

impl FeatureDeriver {
    pub fn new(config: FeatureConfig, as_of: NaiveDate) -> Self {
        Self { config, as_of }
    }

    /// Deriver anchored at the local current date
    pub fn today(config: FeatureConfig) -> Self {
        Self::new(config, chrono::Local::now().date_naive())
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Derive one output per input record, same order
    pub fn derive(&self, records: &[InventoryRecord]) -> PipelineResult<Vec<DerivedRecord>> {
        self.config.validate()?;
        for record in records {
            validate_record(record)?;
        }

        let sales: Vec<f64> = records.iter().map(|r| r.sales_volume).collect();
        let rolling = rolling_mean(&sales, self.config.rolling_window);

        let derived = records
            .iter()
            .zip(rolling)
            .map(|(record, rolling_avg_sales)| {
                let runway = days_until_stockout(
                    record.stock_quantity,
                    record.sales_volume,
                    self.config.sales_period_days,
                );
                let label_stockout = runway
                    .map(|d| d <= self.config.stockout_horizon_days)
                    .unwrap_or(false);
                let lead_time_days = (self.as_of - record.last_restock_date).num_days().max(0);
                let runway_feature = runway
                    .unwrap_or(self.config.runway_cap_days)
                    .min(self.config.runway_cap_days);

                DerivedRecord {
                    features: FeatureVector::new([
                        record.stock_quantity,
                        record.sales_volume,
                        runway_feature,
                        record.reorder_level,
                        lead_time_days as f64,
                        rolling_avg_sales,
                    ]),
                    record: record.clone(),
                    days_until_stockout: runway,
                    label_stockout,
                    rolling_avg_sales,
                    lead_time_days,
                }
            })
            .collect();

        Ok(derived)
    }
}

fn validate_record(record: &InventoryRecord) -> PipelineResult<()> {
    let fields = [
        ("stock_quantity", record.stock_quantity),
        ("sales_volume", record.sales_volume),
        ("reorder_level", record.reorder_level),
        ("reorder_quantity", record.reorder_quantity),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(PipelineError::record(
                Stage::Derive,
                &record.product_id,
                format!("{name} is not a finite number"),
            ));
        }
        if value < 0.0 {
            return Err(PipelineError::record(
                Stage::Derive,
                &record.product_id,
                format!("{name} is negative ({value})"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{as_of, record, synthetic_records};

    fn deriver() -> FeatureDeriver {
        FeatureDeriver::new(FeatureConfig::default(), as_of())
    }

    #[test]
    fn test_rolling_mean_shrinking_window() {
        let sales = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0];
        let rolling = rolling_mean(&sales, 7);
        let expected = [10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 50.0];
        assert_eq!(rolling.len(), expected.len());
        for (got, want) in rolling.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_label_matches_runway() {
        let derived = deriver().derive(&synthetic_records(40)).unwrap();
        for d in &derived {
            let runway = d.days_until_stockout.unwrap();
            assert_eq!(d.label_stockout, runway <= 7.0);
        }
    }

    #[test]
    fn test_label_boundary_is_inclusive() {
        // 7 units at 30 sales per 30 days lasts exactly 7 days
        let derived = deriver()
            .derive(&[record("edge", 7.0, 30.0), record("over", 7.5, 30.0)])
            .unwrap();
        assert_eq!(derived[0].days_until_stockout, Some(7.0));
        assert!(derived[0].label_stockout);
        assert!(!derived[1].label_stockout);
    }

    #[test]
    fn test_zero_sales_is_infinite_runway() {
        let derived = deriver().derive(&[record("idle", 25.0, 0.0)]).unwrap();
        let d = &derived[0];
        assert_eq!(d.days_until_stockout, None);
        assert!(!d.label_stockout);
        assert_eq!(d.features.get("days_until_stockout"), Some(365.0));
    }

    #[test]
    fn test_empty_shelf_with_sales_is_stockout() {
        let derived = deriver().derive(&[record("empty", 0.0, 12.0)]).unwrap();
        assert_eq!(derived[0].days_until_stockout, Some(0.0));
        assert!(derived[0].label_stockout);
    }

    #[test]
    fn test_runway_feature_is_capped() {
        let derived = deriver().derive(&[record("slow", 5000.0, 1.0)]).unwrap();
        assert_eq!(derived[0].days_until_stockout, Some(150000.0));
        assert_eq!(derived[0].features.get("days_until_stockout"), Some(365.0));
    }

    #[test]
    fn test_lead_time_uses_reference_date() {
        let mut future = record("future", 10.0, 10.0);
        future.last_restock_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let derived = deriver()
            .derive(&[record("past", 10.0, 10.0), future])
            .unwrap();
        // fixture restocked 2024-02-20, reference 2024-03-01
        assert_eq!(derived[0].lead_time_days, 10);
        assert_eq!(derived[1].lead_time_days, 0);
    }

    #[test]
    fn test_output_preserves_order_and_length() {
        let records = synthetic_records(15);
        let derived = deriver().derive(&records).unwrap();
        assert_eq!(derived.len(), records.len());
        for (d, r) in derived.iter().zip(&records) {
            assert_eq!(d.record.product_id, r.product_id);
            assert_eq!(d.features.values[0], r.stock_quantity);
        }
    }

    #[test]
    fn test_negative_stock_rejected() {
        let err = deriver().derive(&[record("neg", -1.0, 5.0)]).unwrap_err();
        match err {
            PipelineError::Data { stage, record, .. } => {
                assert_eq!(stage, Stage::Derive);
                assert_eq!(record.as_deref(), Some("neg"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nan_sales_rejected() {
        assert!(deriver().derive(&[record("nan", 3.0, f64::NAN)]).is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = FeatureConfig {
            rolling_window: 0,
            ..Default::default()
        };
        let err = FeatureDeriver::new(config, as_of())
            .derive(&[record("a", 1.0, 1.0)])
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Derive));
    }
}
