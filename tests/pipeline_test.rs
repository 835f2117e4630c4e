//! End-to-end library tests
//!
//! Exercise the full record → prediction path through the public API:
//! reading a snapshot file, training, persisting, reloading and the
//! retrain fallback.

use chrono::NaiveDate;
use std::io::Write;
use stockguard::classifier::{LossHistory, ModelArtifact, NoopObserver};
use stockguard::config::PipelineConfig;
use stockguard::models::InventoryRecord;
use stockguard::pipeline::{load_or_train, ModelOrigin, StockoutPredictor};
use stockguard::source::{JsonFileSource, MemorySource, RecordSource};
use stockguard::{PipelineError, Stage};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// Even rows sell out within days, odd rows have months of stock
fn inventory(n: usize) -> Vec<InventoryRecord> {
    (0..n)
        .map(|i| {
            let (stock, sales) = if i % 2 == 0 {
                (3.0 + (i % 5) as f64, 75.0 + (i % 4) as f64 * 15.0)
            } else {
                (350.0 + (i % 9) as f64 * 25.0, 12.0 + (i % 3) as f64 * 4.0)
            };
            InventoryRecord {
                product_id: format!("P{i:02}"),
                product_name: format!("Grocery item {i}"),
                stock_quantity: stock,
                sales_volume: sales,
                reorder_level: 15.0 + (i % 3) as f64 * 5.0,
                reorder_quantity: 60.0,
                last_restock_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
                    + chrono::Duration::days((i % 25) as i64),
                supplier_name: "Harvest Wholesale".to_string(),
            }
        })
        .collect()
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::from_toml_str(
        r#"
[features]
as_of = "2024-03-01"

[split]
test_fraction = 0.5

[training]
epochs = 25
batch_size = 4
learning_rate = 0.01
"#,
    )
    .unwrap();
    assert_eq!(config.features.as_of, Some(as_of()));
    config.model.path = None;
    config
}

#[test]
fn test_twenty_records_end_to_end() {
    let records = MemorySource::new(inventory(20)).snapshot().unwrap();
    let mut history = LossHistory::default();
    let run = StockoutPredictor::train(&records, &config(), &mut history).unwrap();

    assert_eq!(history.epochs.len(), 25);
    assert!(history
        .epochs
        .iter()
        .all(|e| e.train_loss.is_finite() && e.val_loss.is_some()));

    let results = run.predictor.predict(&records).unwrap();
    assert_eq!(results.len(), 20);
    for (result, record) in results.iter().zip(&records) {
        assert_eq!(result.product_id, record.product_id);
        assert!((0.0..=1.0).contains(&result.predicted_probability));
    }
}

#[test]
fn test_json_snapshot_to_predictions() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    let rows: Vec<serde_json::Value> = inventory(20)
        .iter()
        .map(|r| {
            serde_json::json!({
                "Product_ID": r.product_id,
                "Product_Name": r.product_name,
                "Stock_Quantity": r.stock_quantity,
                "Sales_Volume": r.sales_volume,
                "Reorder_Level": r.reorder_level,
                "Reorder_Quantity": r.reorder_quantity,
                "Last_Order_Date": r.last_restock_date.format("%m/%d/%Y").to_string(),
                "Supplier_Name": r.supplier_name,
            })
        })
        .collect();
    file.write_all(serde_json::to_string(&rows).unwrap().as_bytes())
        .unwrap();

    let records = JsonFileSource::new(file.path()).snapshot().unwrap();
    assert_eq!(records, inventory(20));

    let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();
    assert_eq!(run.predictor.predict(&records).unwrap().len(), 20);
}

#[test]
fn test_persisted_model_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("stockguard.json");
    let records = inventory(20);

    let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();
    let artifact = run.predictor.save(&path).unwrap();
    assert_eq!(artifact.version, 1);

    let reloaded = ModelArtifact::load(&path).unwrap();
    assert_eq!(reloaded.model_id, artifact.model_id);
    assert_eq!(reloaded.checksum, artifact.checksum);

    let predictor = StockoutPredictor::from_artifact(reloaded).with_as_of(Some(as_of()));
    assert_eq!(
        predictor.predict(&records).unwrap(),
        run.predictor.predict(&records).unwrap()
    );
}

#[test]
fn test_fallback_retrains_when_artifact_is_unusable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, "{\"version\": 99}").unwrap();
    let records = inventory(20);

    let (predictor, origin) = load_or_train(&path, &records, &config(), &mut NoopObserver).unwrap();
    assert!(matches!(origin, ModelOrigin::Retrained { .. }));
    assert_eq!(predictor.predict(&records).unwrap().len(), 20);

    let (_, origin) = load_or_train(&path, &records, &config(), &mut NoopObserver).unwrap();
    assert!(matches!(origin, ModelOrigin::Loaded { .. }));
}

#[test]
fn test_bad_record_is_reported_with_context() {
    let mut records = inventory(6);
    records[3].sales_volume = -4.0;

    let err = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap_err();
    match &err {
        PipelineError::Data { stage, record, .. } => {
            assert_eq!(*stage, Stage::Derive);
            assert_eq!(record.as_deref(), Some("P03"));
        }
        other => panic!("expected data error, got {other}"),
    }
    assert!(err.is_recoverable());
}
