//! Training for the stockout classifier
//!
//! Mini-batch Adam on binary cross-entropy. Each epoch reshuffles the
//! training subset, then measures validation loss on the evaluation subset
//! with dropout off and no parameter updates.
//!
//! The trainer works on a copy of the classifier and only hands it back
//! when training finishes without diverging.

use super::dataset::Sample;
use super::model::{bce, Classifier};
use super::optim::Adam;
use crate::error::{PipelineError, PipelineResult, Stage};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Batch size
    pub batch_size: usize,
    /// Number of epochs
    pub epochs: usize,
    /// Seed for weight init, shuffling and dropout
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 32,
            epochs: 50,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PipelineError::data(
                Stage::Train,
                format!("learning rate must be positive, got {}", self.learning_rate),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::data(Stage::Train, "batch size must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(PipelineError::data(Stage::Train, "epochs must be at least 1"));
        }
        Ok(())
    }
}

/// Loss summary for one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochStats {
    /// 1-based epoch number
    pub epoch: usize,
    pub epochs: usize,
    /// Mean batch loss over the epoch
    pub train_loss: f64,
    /// `None` when there is no evaluation subset
    pub val_loss: Option<f64>,
}

/// Training result
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub trace: Vec<EpochStats>,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub optimizer_steps: u64,
}

impl TrainReport {
    pub fn final_train_loss(&self) -> Option<f64> {
        self.trace.last().map(|s| s.train_loss)
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.trace.last().and_then(|s| s.val_loss)
    }
}

/// Per-epoch callback
pub trait EpochObserver {
    fn on_epoch(&mut self, stats: &EpochStats);

    fn on_finish(&mut self, _report: &TrainReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl EpochObserver for NoopObserver {
    fn on_epoch(&mut self, _stats: &EpochStats) {}
}

/// Logs the first, every tenth and the last epoch
#[derive(Debug, Default)]
pub struct TracingObserver;

impl EpochObserver for TracingObserver {
    fn on_epoch(&mut self, stats: &EpochStats) {
        if stats.epoch == 1 || stats.epoch % 10 == 0 || stats.epoch == stats.epochs {
            match stats.val_loss {
                Some(val) => tracing::info!(
                    "Epoch {}/{}: train_loss={:.4}, val_loss={:.4}",
                    stats.epoch,
                    stats.epochs,
                    stats.train_loss,
                    val
                ),
                None => tracing::info!(
                    "Epoch {}/{}: train_loss={:.4}",
                    stats.epoch,
                    stats.epochs,
                    stats.train_loss
                ),
            }
        }
    }
}

/// Keeps every epoch's losses, e.g. for plotting
#[derive(Debug, Default, Clone)]
pub struct LossHistory {
    pub epochs: Vec<EpochStats>,
}

impl EpochObserver for LossHistory {
    fn on_epoch(&mut self, stats: &EpochStats) {
        self.epochs.push(*stats);
    }
}

/// Cooperative stop request, honoured at the next epoch boundary
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mean BCE of a frozen classifier over `samples`
pub fn mean_loss<C: Classifier>(model: &C, samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples
        .iter()
        .map(|s| bce(model.predict_proba(&s.features), s.target()))
        .sum::<f64>()
        / samples.len() as f64
}

pub struct Trainer {
    config: TrainConfig,
    cancel: Option<CancelFlag>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train `model` on `train`, reporting validation loss on `eval`.
    ///
    /// On error `model` is left exactly as it was passed in.
    pub fn fit<C: Classifier>(
        &self,
        model: &mut C,
        train: &[Sample],
        eval: &[Sample],
        observer: &mut dyn EpochObserver,
    ) -> PipelineResult<TrainReport> {
        self.config.validate()?;
        if train.is_empty() {
            return Err(PipelineError::data(Stage::Train, "training subset is empty"));
        }

        tracing::info!(
            "Training: {} examples, Validation: {} examples",
            train.len(),
            eval.len()
        );

        let mut candidate = model.clone();
        let mut optimizer = Adam::new(self.config.learning_rate, candidate.parameter_count());
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut shuffled = train.to_vec();
        let mut trace = Vec::with_capacity(self.config.epochs);
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            shuffled.shuffle(&mut rng);

            let mut running_loss = 0.0;
            let mut batches = 0usize;
            for (b, chunk) in shuffled.chunks(self.config.batch_size).enumerate() {
                let step = candidate.batch_gradients(chunk, Some(&mut rng));
                if !step.loss.is_finite() || step.gradients.iter().any(|g| !g.is_finite()) {
                    return Err(PipelineError::TrainingDiverged {
                        epoch,
                        batch: b + 1,
                        loss: step.loss,
                    });
                }
                let delta = optimizer.step(&step.gradients);
                candidate.update(&delta);
                running_loss += step.loss;
                batches += 1;
            }

            if candidate.parameters().iter().any(|p| !p.is_finite()) {
                return Err(PipelineError::TrainingDiverged {
                    epoch,
                    batch: batches,
                    loss: f64::NAN,
                });
            }

            let val_loss = (!eval.is_empty()).then(|| mean_loss(&candidate, eval));
            if let Some(val) = val_loss.filter(|v| !v.is_finite()) {
                return Err(PipelineError::TrainingDiverged {
                    epoch,
                    batch: batches,
                    loss: val,
                });
            }

            let stats = EpochStats {
                epoch,
                epochs: self.config.epochs,
                train_loss: running_loss / batches.max(1) as f64,
                val_loss,
            };
            observer.on_epoch(&stats);
            trace.push(stats);

            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                tracing::warn!("Training cancelled after epoch {}", epoch);
                stopped_early = epoch < self.config.epochs;
                break;
            }
        }

        *model = candidate;
        let report = TrainReport {
            epochs_run: trace.len(),
            trace,
            stopped_early,
            optimizer_steps: optimizer.steps(),
        };
        observer.on_finish(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::dataset::{prepare, SplitConfig};
    use crate::classifier::features::{FeatureConfig, FeatureDeriver, FeatureVector};
    use crate::classifier::model::{BatchGradients, LogisticClassifier, MlpClassifier};
    use crate::models::tests::{as_of, record};

    /// Empty shelves with steady sales vs. deep stock with almost no sales
    fn separable_records(n: usize) -> Vec<crate::models::InventoryRecord> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    record(&format!("out-{i}"), 0.0, 10.0 + (i % 9) as f64 * 10.0)
                } else {
                    record(&format!("deep-{i}"), 1000.0, 1.0)
                }
            })
            .collect()
    }

    fn sample(label: bool) -> Sample {
        Sample {
            index: 0,
            features: FeatureVector::new([if label { 1.0 } else { -1.0 }, 0.0, 0.0, 0.0, 0.0, 0.0]),
            label,
        }
    }

    #[test]
    fn test_train_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.learning_rate, 0.001);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        for config in [
            TrainConfig { learning_rate: 0.0, ..Default::default() },
            TrainConfig { learning_rate: f64::NAN, ..Default::default() },
            TrainConfig { batch_size: 0, ..Default::default() },
            TrainConfig { epochs: 0, ..Default::default() },
        ] {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_empty_training_subset_fails_before_any_epoch() {
        let mut model = LogisticClassifier::new(1);
        let mut history = LossHistory::default();
        let err = Trainer::new(TrainConfig::default())
            .fit(&mut model, &[], &[sample(true)], &mut history)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Train));
        assert!(history.epochs.is_empty());
    }

    #[test]
    fn test_separable_data_converges() {
        let deriver = FeatureDeriver::new(FeatureConfig::default(), as_of());
        let derived = deriver.derive(&separable_records(60)).unwrap();
        let data = prepare(&derived, &SplitConfig::default()).unwrap();

        let mut model = MlpClassifier::new(&[64, 32], 0.2, 42).unwrap();
        let config = TrainConfig {
            learning_rate: 0.01,
            batch_size: 8,
            epochs: 60,
            seed: 42,
        };
        let mut history = LossHistory::default();
        let report = Trainer::new(config)
            .fit(&mut model, &data.train, &data.eval, &mut history)
            .unwrap();

        assert_eq!(report.epochs_run, 60);
        assert_eq!(history.epochs.len(), 60);

        let early: f64 = report.trace[..5].iter().map(|s| s.train_loss).sum::<f64>() / 5.0;
        let late: f64 = report.trace[55..].iter().map(|s| s.train_loss).sum::<f64>() / 5.0;
        assert!(late < early, "loss went from {early} to {late}");

        for s in data.train.iter().chain(&data.eval) {
            let p = model.predict_proba(&s.features);
            if s.label {
                assert!(p > 0.9, "stockout sample scored {p}");
            } else {
                assert!(p < 0.1, "well-stocked sample scored {p}");
            }
        }
    }

    #[test]
    fn test_training_is_reproducible() {
        let train: Vec<Sample> = (0..20).map(|i| sample(i % 2 == 0)).collect();
        let config = TrainConfig { epochs: 5, batch_size: 4, ..Default::default() };

        let mut a = MlpClassifier::new(&[8], 0.2, 3).unwrap();
        let mut b = a.clone();
        Trainer::new(config.clone()).fit(&mut a, &train, &[], &mut NoopObserver).unwrap();
        Trainer::new(config).fit(&mut b, &train, &[], &mut NoopObserver).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation_loss_absent_without_eval_subset() {
        let train: Vec<Sample> = (0..6).map(|i| sample(i % 2 == 0)).collect();
        let mut model = LogisticClassifier::new(1);
        let report = Trainer::new(TrainConfig { epochs: 2, ..Default::default() })
            .fit(&mut model, &train, &[], &mut NoopObserver)
            .unwrap();
        assert!(report.final_val_loss().is_none());
        assert!(report.final_train_loss().is_some());
    }

    #[test]
    fn test_validation_does_not_touch_eval_samples() {
        let train: Vec<Sample> = (0..10).map(|i| sample(i % 2 == 0)).collect();
        let eval = vec![sample(true), sample(false)];
        let before = eval.clone();
        let mut model = LogisticClassifier::new(2);
        Trainer::new(TrainConfig { epochs: 3, ..Default::default() })
            .fit(&mut model, &train, &eval, &mut NoopObserver)
            .unwrap();
        assert_eq!(eval, before);
    }

    #[test]
    fn test_cancel_stops_at_epoch_boundary() {
        let train: Vec<Sample> = (0..10).map(|i| sample(i % 2 == 0)).collect();
        let flag = CancelFlag::new();
        flag.cancel();
        let mut model = LogisticClassifier::new(1);
        let report = Trainer::new(TrainConfig { epochs: 20, batch_size: 2, ..Default::default() })
            .with_cancel(flag)
            .fit(&mut model, &train, &[], &mut NoopObserver)
            .unwrap();
        assert_eq!(report.epochs_run, 1);
        assert!(report.stopped_early);
        assert_eq!(report.optimizer_steps, 5);
    }

    /// Produces a non-finite loss on every batch
    #[derive(Clone)]
    struct Exploding(LogisticClassifier);

    impl Classifier for Exploding {
        fn predict_proba(&self, features: &FeatureVector) -> f64 {
            self.0.predict_proba(features)
        }

        fn parameters(&self) -> Vec<f64> {
            self.0.parameters()
        }

        fn update(&mut self, delta: &[f64]) {
            self.0.update(delta)
        }

        fn batch_gradients(&self, batch: &[Sample], rng: Option<&mut ChaCha8Rng>) -> BatchGradients {
            let mut step = self.0.batch_gradients(batch, rng);
            step.loss = f64::NAN;
            step
        }
    }

    #[test]
    fn test_divergence_keeps_prior_parameters() {
        let train: Vec<Sample> = (0..8).map(|i| sample(i % 2 == 0)).collect();
        let mut model = Exploding(LogisticClassifier::new(4));
        let before = model.parameters();

        let err = Trainer::new(TrainConfig::default())
            .fit(&mut model, &train, &[], &mut NoopObserver)
            .unwrap_err();

        match err {
            PipelineError::TrainingDiverged { epoch, batch, loss } => {
                assert_eq!((epoch, batch), (1, 1));
                assert!(loss.is_nan());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(model.parameters(), before);
    }
}
