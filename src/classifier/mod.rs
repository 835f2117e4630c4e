//! Stockout risk classifier
//!
//! A small feed-forward network that estimates the probability that an
//! inventory item runs out of stock within the prediction horizon.
//!
//! Flow: InventoryRecord → FeatureDeriver → split + standardize →
//! Trainer (Adam, BCE) → Evaluator → persisted ModelArtifact.
//!
//! Normalization stats are fitted on the training subset only and shipped
//! with the model; inference never refits them.

pub mod dataset;
pub mod evaluate;
pub mod features;
pub mod model;
pub mod optim;
pub mod persist;
pub mod thresholds;
pub mod train;

pub use dataset::{prepare, NormalizationStats, PreparedData, Sample, SplitConfig};
pub use evaluate::{
    evaluate, evaluate_probabilities, ClassMetrics, ClassificationReport, ConfusionMatrix, Evaluation,
};
pub use features::{DerivedRecord, FeatureConfig, FeatureDeriver, FeatureVector, FEATURE_NAMES};
pub use model::{Classifier, ModelConfig, ModelKind, StockoutModel};
pub use persist::{default_model_path, ModelArtifact};
pub use thresholds::ThresholdConfig;
pub use train::{
    CancelFlag, EpochObserver, EpochStats, LossHistory, NoopObserver, TracingObserver, TrainConfig,
    TrainReport, Trainer,
};

use rayon::prelude::*;

/// Stockout probabilities for derived records, input order kept
pub fn score_records<C: Classifier>(
    derived: &[DerivedRecord],
    model: &C,
    stats: &NormalizationStats,
) -> Vec<f64> {
    derived
        .par_iter()
        .map(|d| model.predict_proba(&stats.transform(&d.features)))
        .collect()
}
