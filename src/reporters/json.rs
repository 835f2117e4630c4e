//! JSON reporter
//!
//! Pretty-printed JSON for predictions, training summaries and dataset
//! statistics. Predictions use the serving shape: one object per record.

use anyhow::Result;
use serde::Serialize;

pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::{test_predictions, test_summary};

    #[test]
    fn test_predictions_json_shape() {
        let json_str = render(&test_predictions()).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        let items = parsed.as_array().expect("array");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["product_id"], "SKU-001");
        assert_eq!(items[0]["predicted_stockout"], true);
        assert_eq!(items[0]["risk_level"], "high");
        assert!(items[2]["days_until_stockout"].is_null());
    }

    #[test]
    fn test_summary_undefined_metrics_are_null() {
        let mut summary = test_summary();
        summary.report.stockout.precision = None;
        let json_str = render(&summary).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        assert!(parsed["report"]["stockout"]["precision"].is_null());
        assert_eq!(parsed["model_kind"], "mlp");
        assert_eq!(parsed["trace"].as_array().expect("trace").len(), 2);
    }

    #[test]
    fn test_empty_predictions() {
        let empty: Vec<crate::models::PredictionResult> = Vec::new();
        assert_eq!(render(&empty).expect("render JSON"), "[]");
    }
}
