//! Stockout prediction pipeline
//!
//! Orchestrates the full pass:
//! 1. Derive features and labels from the record snapshot
//! 2. Split and fit normalization on the training subset
//! 3. Train the classifier
//! 4. Evaluate on the held-out subset
//!
//! The result is a `StockoutPredictor`: an owned, frozen model plus the
//! stats and settings it was trained with. It is the only thing the serving
//! and reporting layers talk to.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{
    evaluate, prepare, score_records, CancelFlag, DerivedRecord, EpochObserver, Evaluation,
    FeatureConfig, FeatureDeriver, ModelArtifact, NormalizationStats, StockoutModel,
    ThresholdConfig, TrainReport, Trainer,
};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::models::{InventoryRecord, PredictionResult};

/// Frozen model with everything needed to score new records
#[derive(Debug, Clone, PartialEq)]
pub struct StockoutPredictor {
    model: StockoutModel,
    stats: NormalizationStats,
    features: FeatureConfig,
    thresholds: ThresholdConfig,
    /// Reference date for lead time; today when unset
    as_of: Option<NaiveDate>,
}

/// Output of a full training pass
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub predictor: StockoutPredictor,
    pub report: TrainReport,
    pub evaluation: Evaluation,
    /// Held-out records with their predictions, in evaluation order
    pub holdout: Vec<PredictionResult>,
}

/// Where the predictor returned by `load_or_train` came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOrigin {
    Loaded { model_id: Uuid },
    Retrained { reason: String },
}

impl StockoutPredictor {
    pub fn new(
        model: StockoutModel,
        stats: NormalizationStats,
        features: FeatureConfig,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            model,
            stats,
            features,
            thresholds,
            as_of: None,
        }
    }

    /// Pin the reference date used for lead time
    pub fn with_as_of(mut self, as_of: Option<NaiveDate>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn model(&self) -> &StockoutModel {
        &self.model
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    pub fn feature_config(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Run derive → split → train → evaluate on one record snapshot
    pub fn train(
        records: &[InventoryRecord],
        config: &PipelineConfig,
        observer: &mut dyn EpochObserver,
    ) -> PipelineResult<TrainingRun> {
        Self::train_with_cancel(records, config, None, observer)
    }

    /// Like `train`, stopping after the current epoch once `cancel` is set
    pub fn train_with_cancel(
        records: &[InventoryRecord],
        config: &PipelineConfig,
        cancel: Option<CancelFlag>,
        observer: &mut dyn EpochObserver,
    ) -> PipelineResult<TrainingRun> {
        config.validate()?;

        let deriver = config.feature_deriver();
        info!(
            "Deriving features for {} records (as of {})",
            records.len(),
            deriver.as_of()
        );
        let derived = deriver.derive(records)?;

        let prepared = prepare(&derived, &config.split)?;
        debug!("Normalization stats: {:?}", prepared.stats);

        let mut model = StockoutModel::from_config(&config.model.model, config.training.seed)?;
        let mut trainer = Trainer::new(config.training.clone());
        if let Some(flag) = cancel {
            trainer = trainer.with_cancel(flag);
        }
        let report = trainer.fit(&mut model, &prepared.train, &prepared.eval, observer)?;

        let evaluation = evaluate(&model, &prepared.eval, config.evaluation.threshold)?;
        info!(
            "Evaluation on {} records: accuracy {:.3}",
            prepared.eval.len(),
            evaluation.accuracy
        );

        let holdout = prepared
            .eval
            .iter()
            .zip(&evaluation.probabilities)
            .map(|(sample, &p)| prediction_for(&derived[sample.index], p, &config.evaluation))
            .collect();

        let predictor = Self::new(
            model,
            prepared.stats,
            config.features.derive.clone(),
            config.evaluation.clone(),
        )
        .with_as_of(config.features.as_of);

        Ok(TrainingRun {
            predictor,
            report,
            evaluation,
            holdout,
        })
    }

    /// One prediction per input record, input order kept
    ///
    /// Uses the stored normalization stats as-is.
    pub fn predict(&self, records: &[InventoryRecord]) -> PipelineResult<Vec<PredictionResult>> {
        let deriver = match self.as_of {
            Some(date) => FeatureDeriver::new(self.features.clone(), date),
            None => FeatureDeriver::today(self.features.clone()),
        };
        let derived = deriver.derive(records)?;
        let probabilities = score_records(&derived, &self.model, &self.stats);

        Ok(derived
            .iter()
            .zip(probabilities)
            .map(|(d, p)| prediction_for(d, p, &self.thresholds))
            .collect())
    }

    pub fn to_artifact(&self) -> PipelineResult<ModelArtifact> {
        ModelArtifact::new(
            self.features.clone(),
            self.stats.clone(),
            self.model.clone(),
            self.thresholds.clone(),
        )
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let payload = artifact.payload;
        Self::new(payload.model, payload.stats, payload.features, payload.thresholds)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<ModelArtifact> {
        let artifact = self.to_artifact()?;
        artifact.save(path)?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        ModelArtifact::load(path).map(Self::from_artifact)
    }
}

fn prediction_for(
    derived: &DerivedRecord,
    probability: f64,
    thresholds: &ThresholdConfig,
) -> PredictionResult {
    let record = &derived.record;
    PredictionResult {
        product_id: record.product_id.clone(),
        product_name: record.product_name.clone(),
        stock_quantity: record.stock_quantity,
        sales_volume: record.sales_volume,
        days_until_stockout: derived.days_until_stockout,
        predicted_probability: probability,
        predicted_stockout: thresholds.is_stockout(probability),
        risk_level: thresholds.risk_level(probability),
    }
}

/// Label distribution of a record snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub records: usize,
    pub stockout: usize,
    pub no_stockout: usize,
    /// Records without sales (infinite runway)
    pub zero_sales: usize,
    pub stockout_rate: f64,
    /// Mean over records with a finite runway
    pub mean_days_until_stockout: Option<f64>,
}

impl DatasetStats {
    pub fn from_derived(derived: &[DerivedRecord]) -> Self {
        let stockout = derived.iter().filter(|d| d.label_stockout).count();
        let runways: Vec<f64> = derived.iter().filter_map(|d| d.days_until_stockout).collect();
        Self {
            records: derived.len(),
            stockout,
            no_stockout: derived.len() - stockout,
            zero_sales: derived.len() - runways.len(),
            stockout_rate: if derived.is_empty() {
                0.0
            } else {
                stockout as f64 / derived.len() as f64
            },
            mean_days_until_stockout: (!runways.is_empty())
                .then(|| runways.iter().sum::<f64>() / runways.len() as f64),
        }
    }
}

/// Derive labels for `records` and summarize them without training
pub fn dataset_stats(
    records: &[InventoryRecord],
    config: &PipelineConfig,
) -> PipelineResult<DatasetStats> {
    let derived = config.feature_deriver().derive(records)?;
    Ok(DatasetStats::from_derived(&derived))
}

/// Load the artifact at `path`, or retrain from `records` when it cannot
/// be used
///
/// A retrained model is saved back to `path`; a failed save is logged and
/// the freshly trained predictor is still returned.
pub fn load_or_train(
    path: &Path,
    records: &[InventoryRecord],
    config: &PipelineConfig,
    observer: &mut dyn EpochObserver,
) -> PipelineResult<(StockoutPredictor, ModelOrigin)> {
    match ModelArtifact::load(path) {
        Ok(artifact) => {
            let model_id = artifact.model_id;
            info!("Using model {} from {}", model_id, path.display());
            let predictor =
                StockoutPredictor::from_artifact(artifact).with_as_of(config.features.as_of);
            Ok((predictor, ModelOrigin::Loaded { model_id }))
        }
        Err(e) => {
            warn!("Cannot use model artifact, retraining: {}", e);
            let run = StockoutPredictor::train(records, config, observer)?;
            if let Err(save_err) = run.predictor.save(path) {
                warn!("Retrained model was not saved: {}", save_err);
            }
            Ok((
                run.predictor,
                ModelOrigin::Retrained {
                    reason: e.to_string(),
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LossHistory, ModelKind, NoopObserver};
    use crate::error::{PipelineError, Stage};
    use crate::models::tests::{as_of, record, synthetic_records};
    use crate::models::RiskLevel;
    use tempfile::TempDir;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.features.as_of = Some(as_of());
        config.split.test_fraction = 0.5;
        config.training.epochs = 20;
        config.training.batch_size = 4;
        config.training.learning_rate = 0.01;
        config
    }

    #[test]
    fn test_dataset_stats() {
        let mut records = synthetic_records(10);
        records.push(record("idle", 40.0, 0.0));
        let stats = dataset_stats(&records, &config()).unwrap();
        assert_eq!(stats.records, 11);
        assert_eq!(stats.stockout, 5);
        assert_eq!(stats.no_stockout, 6);
        assert_eq!(stats.zero_sales, 1);
        assert!(stats.mean_days_until_stockout.is_some());
    }

    #[test]
    fn test_end_to_end_twenty_records() {
        let records = synthetic_records(20);
        let mut history = LossHistory::default();
        let run = StockoutPredictor::train(&records, &config(), &mut history).unwrap();

        assert_eq!(history.epochs.len(), 20);
        assert_eq!(run.report.epochs_run, 20);
        assert_eq!(run.holdout.len(), 10);
        assert_eq!(run.evaluation.predictions.len(), 10);

        let results = run.predictor.predict(&records).unwrap();
        assert_eq!(results.len(), 20);
        for (result, record) in results.iter().zip(&records) {
            assert_eq!(result.product_id, record.product_id);
            assert!((0.0..=1.0).contains(&result.predicted_probability));
            assert_eq!(
                result.predicted_stockout,
                result.predicted_probability > run.predictor.thresholds().threshold
            );
        }
    }

    #[test]
    fn test_holdout_joins_back_to_records() {
        let records = synthetic_records(20);
        let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();

        for (result, &p) in run.holdout.iter().zip(&run.evaluation.probabilities) {
            let source = records
                .iter()
                .find(|r| r.product_id == result.product_id)
                .unwrap();
            assert_eq!(result.stock_quantity, source.stock_quantity);
            assert_eq!(result.predicted_probability, p);
        }
    }

    #[test]
    fn test_predict_is_deterministic_and_keeps_stats() {
        let records = synthetic_records(20);
        let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();
        let stats_before = run.predictor.stats().clone();

        let first = run.predictor.predict(&records[..7]).unwrap();
        let second = run.predictor.predict(&records[..7]).unwrap();
        assert_eq!(first, second);
        assert_eq!(run.predictor.stats(), &stats_before);
    }

    #[test]
    fn test_zero_sales_record_predicts() {
        let records = synthetic_records(20);
        let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();

        let results = run.predictor.predict(&[record("idle", 30.0, 0.0)]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].days_until_stockout, None);
        assert!(results[0].predicted_probability.is_finite());
    }

    #[test]
    fn test_logistic_family_trains() {
        let mut config = config();
        config.model.model.kind = ModelKind::Logistic;
        let run = StockoutPredictor::train(&synthetic_records(20), &config, &mut NoopObserver).unwrap();
        assert_eq!(run.predictor.model().kind(), ModelKind::Logistic);
    }

    #[test]
    fn test_single_class_data_is_rejected() {
        let records: Vec<_> = (0..20)
            .map(|i| record(&format!("safe-{i}"), 500.0 + i as f64, 10.0))
            .collect();
        let err = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Split));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let mut config = config();
        config.evaluation.threshold = 1.5;
        let mut history = LossHistory::default();
        assert!(StockoutPredictor::train(&synthetic_records(20), &config, &mut history).is_err());
        assert!(history.epochs.is_empty());
    }

    #[test]
    fn test_threshold_override_changes_flags() {
        let records = synthetic_records(20);
        let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();

        let strict = run.predictor.clone().with_thresholds(ThresholdConfig::new(1.0));
        assert!(strict
            .predict(&records)
            .unwrap()
            .iter()
            .all(|r| !r.predicted_stockout && r.risk_level == RiskLevel::Low));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let records = synthetic_records(20);
        let run = StockoutPredictor::train(&records, &config(), &mut NoopObserver).unwrap();
        run.predictor.save(&path).unwrap();

        let loaded = StockoutPredictor::load(&path).unwrap().with_as_of(Some(as_of()));
        assert_eq!(loaded, run.predictor);
        assert_eq!(loaded.predict(&records).unwrap(), run.predictor.predict(&records).unwrap());
    }

    #[test]
    fn test_load_or_train_retrains_then_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let records = synthetic_records(20);

        let (first, origin) = load_or_train(&path, &records, &config(), &mut NoopObserver).unwrap();
        assert!(matches!(origin, ModelOrigin::Retrained { .. }));
        assert!(path.exists());

        let (second, origin) = load_or_train(&path, &records, &config(), &mut NoopObserver).unwrap();
        assert!(matches!(origin, ModelOrigin::Loaded { .. }));
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_or_train_survives_corrupt_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ \"version\": 1 ").unwrap();

        let (predictor, origin) =
            load_or_train(&path, &synthetic_records(20), &config(), &mut NoopObserver).unwrap();
        match origin {
            ModelOrigin::Retrained { reason } => assert!(reason.contains("malformed")),
            other => panic!("expected retrain, got {other:?}"),
        }
        assert!(StockoutPredictor::load(&path).is_ok());
        assert_eq!(predictor.predict(&synthetic_records(3)).unwrap().len(), 3);
    }

    #[test]
    fn test_load_or_train_propagates_training_errors() {
        let dir = TempDir::new().unwrap();
        let err = load_or_train(
            &dir.path().join("absent.json"),
            &[record("only", 5.0, 50.0)],
            &config(),
            &mut NoopObserver,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Data { .. }));
    }
}
