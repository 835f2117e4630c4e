//! Train/evaluation split and feature standardization
//!
//! Normalization statistics are fitted on the training subset only and then
//! applied unchanged to the evaluation subset and to every later inference
//! batch.

use super::features::{DerivedRecord, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::error::{PipelineError, PipelineResult, Stage};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A labelled feature vector, tagged with the position of its source record
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub features: FeatureVector,
    pub label: bool,
}

impl Sample {
    pub fn from_derived(index: usize, derived: &DerivedRecord) -> Self {
        Self {
            index,
            features: derived.features,
            label: derived.label_stockout,
        }
    }

    /// Label as a BCE target
    pub fn target(&self) -> f64 {
        if self.label {
            1.0
        } else {
            0.0
        }
    }
}

/// Split parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction held out for evaluation
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Per-feature standardization fitted on the training subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub means: [f64; FEATURE_COUNT],
    /// Population standard deviation; 1.0 for constant features
    pub stds: [f64; FEATURE_COUNT],
    /// Features whose training spread was below `MIN_STD`
    pub constant: [bool; FEATURE_COUNT],
}

impl NormalizationStats {
    pub const MIN_STD: f64 = 1e-8;

    pub fn fit(samples: &[Sample]) -> PipelineResult<Self> {
        if samples.is_empty() {
            return Err(PipelineError::data(
                Stage::Normalize,
                "cannot fit normalization on an empty training subset",
            ));
        }

        let n = samples.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        for s in samples {
            for (m, v) in means.iter_mut().zip(s.features.values) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = [0.0; FEATURE_COUNT];
        for s in samples {
            for (i, v) in s.features.values.iter().enumerate() {
                stds[i] += (v - means[i]).powi(2);
            }
        }

        let mut constant = [false; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            stds[i] = (stds[i] / n).sqrt();
            if stds[i] < Self::MIN_STD {
                debug!("Feature {} is constant in training data", FEATURE_NAMES[i]);
                constant[i] = true;
                stds[i] = 1.0;
            }
        }

        Ok(Self {
            means,
            stds,
            constant,
        })
    }

    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut values = features.values;
        for (i, v) in values.iter_mut().enumerate() {
            *v = (*v - self.means[i]) / self.stds[i];
        }
        FeatureVector::new(values)
    }

    pub fn inverse_transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut values = features.values;
        for (i, v) in values.iter_mut().enumerate() {
            *v = *v * self.stds[i] + self.means[i];
        }
        FeatureVector::new(values)
    }

    pub fn transform_samples(&self, samples: &[Sample]) -> Vec<Sample> {
        samples
            .iter()
            .map(|s| Sample {
                features: self.transform(&s.features),
                ..s.clone()
            })
            .collect()
    }

    /// Sanity check for stats that come from outside (e.g. a model artifact)
    pub fn is_valid(&self) -> bool {
        self.means.iter().all(|m| m.is_finite())
            && self.stds.iter().all(|s| s.is_finite() && *s >= Self::MIN_STD)
    }
}

/// Normalized train and evaluation subsets with the stats that produced them
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: Vec<Sample>,
    pub eval: Vec<Sample>,
    pub stats: NormalizationStats,
}

/// Uniform random partition without replacement into (train, eval)
pub fn split<R: Rng + ?Sized>(
    mut samples: Vec<Sample>,
    test_fraction: f64,
    rng: &mut R,
) -> PipelineResult<(Vec<Sample>, Vec<Sample>)> {
    if samples.len() < 2 {
        return Err(PipelineError::data(
            Stage::Split,
            format!("need at least 2 records to split, got {}", samples.len()),
        ));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::data(
            Stage::Split,
            format!("test fraction must be in (0, 1), got {test_fraction}"),
        ));
    }

    let n = samples.len();
    let eval_len = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    samples.shuffle(rng);
    let train = samples.split_off(eval_len);
    Ok((train, samples))
}

/// Split, check both classes are present in the evaluation subset, then fit
/// and apply normalization
pub fn prepare(derived: &[DerivedRecord], config: &SplitConfig) -> PipelineResult<PreparedData> {
    let samples: Vec<Sample> = derived
        .iter()
        .enumerate()
        .map(|(i, d)| Sample::from_derived(i, d))
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (train, eval) = split(samples, config.test_fraction, &mut rng)?;

    let positives = eval.iter().filter(|s| s.label).count();
    let negatives = eval.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::data(
            Stage::Split,
            format!(
                "evaluation subset needs both classes, got {positives} stockout and {negatives} \
                 non-stockout records"
            ),
        ));
    }

    debug!(
        "Split {} records: {} train, {} eval ({} positive)",
        derived.len(),
        train.len(),
        eval.len(),
        positives
    );

    let stats = NormalizationStats::fit(&train)?;
    Ok(PreparedData {
        train: stats.transform_samples(&train),
        eval: stats.transform_samples(&eval),
        stats,
    })
}
