//! Evaluation of a trained classifier
//!
//! Applies the decision threshold and reports accuracy plus per-class
//! precision, recall and F1. A metric whose denominator is zero (no
//! predictions of a class, or no true instances of it) is reported as
//! `None` ("undefined") instead of failing.

use super::dataset::Sample;
use super::model::Classifier;
use super::thresholds::check_threshold;
use crate::error::{PipelineError, PipelineResult, Stage};
use rayon::prelude::*;
use serde::Serialize;

/// Precision/recall/F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    /// True instances of the class
    pub support: usize,
    /// Records predicted as the class
    pub predicted: usize,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

impl ClassMetrics {
    fn compute(true_positives: usize, predicted: usize, support: usize) -> Self {
        let precision = (predicted > 0).then(|| true_positives as f64 / predicted as f64);
        let recall = (support > 0).then(|| true_positives as f64 / support as f64);
        let f1 = match (precision, recall) {
            (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
            (Some(_), Some(_)) => Some(0.0),
            _ => None,
        };
        Self {
            support,
            predicted,
            precision,
            recall,
            f1,
        }
    }
}

/// Averages over the classes where a metric is defined
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

impl AverageMetrics {
    fn macro_avg(classes: &[&ClassMetrics]) -> Self {
        let avg = |pick: fn(&ClassMetrics) -> Option<f64>| {
            let values: Vec<f64> = classes.iter().filter_map(|c| pick(c)).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        Self {
            precision: avg(|c| c.precision),
            recall: avg(|c| c.recall),
            f1: avg(|c| c.f1),
        }
    }

    fn weighted_avg(classes: &[&ClassMetrics]) -> Self {
        let avg = |pick: fn(&ClassMetrics) -> Option<f64>| {
            let (sum, weight) = classes
                .iter()
                .filter_map(|c| pick(c).map(|v| (v * c.support as f64, c.support as f64)))
                .fold((0.0, 0.0), |(s, w), (v, cw)| (s + v, w + cw));
            (weight > 0.0).then(|| sum / weight)
        };
        Self {
            precision: avg(|c| c.precision),
            recall: avg(|c| c.recall),
            f1: avg(|c| c.f1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

/// Per-class report, positive class is "stockout"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub no_stockout: ClassMetrics,
    pub stockout: ClassMetrics,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

/// Scores of one evaluation subset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub threshold: f64,
    pub probabilities: Vec<f64>,
    pub predictions: Vec<bool>,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

/// Threshold fixed probabilities against true labels
pub fn evaluate_probabilities(
    probabilities: &[f64],
    labels: &[bool],
    threshold: f64,
) -> PipelineResult<Evaluation> {
    check_threshold(threshold)?;
    if probabilities.is_empty() {
        return Err(PipelineError::data(Stage::Evaluate, "nothing to evaluate"));
    }
    if probabilities.len() != labels.len() {
        return Err(PipelineError::data(
            Stage::Evaluate,
            format!(
                "probability count ({}) does not match label count ({})",
                probabilities.len(),
                labels.len()
            ),
        ));
    }
    if let Some(i) = probabilities.iter().position(|p| !(0.0..=1.0).contains(p)) {
        return Err(PipelineError::record(
            Stage::Evaluate,
            format!("#{i}"),
            format!("probability {} outside [0, 1]", probabilities[i]),
        ));
    }

    let predictions: Vec<bool> = probabilities.iter().map(|&p| p > threshold).collect();

    let mut confusion = ConfusionMatrix::default();
    for (&pred, &actual) in predictions.iter().zip(labels) {
        match (pred, actual) {
            (true, true) => confusion.true_positives += 1,
            (true, false) => confusion.false_positives += 1,
            (false, false) => confusion.true_negatives += 1,
            (false, true) => confusion.false_negatives += 1,
        }
    }

    let c = confusion;
    let stockout = ClassMetrics::compute(
        c.true_positives,
        c.true_positives + c.false_positives,
        c.true_positives + c.false_negatives,
    );
    let no_stockout = ClassMetrics::compute(
        c.true_negatives,
        c.true_negatives + c.false_negatives,
        c.true_negatives + c.false_positives,
    );
    let classes = [&no_stockout, &stockout];
    let report = ClassificationReport {
        macro_avg: AverageMetrics::macro_avg(&classes),
        weighted_avg: AverageMetrics::weighted_avg(&classes),
        no_stockout,
        stockout,
    };

    Ok(Evaluation {
        threshold,
        accuracy: (c.true_positives + c.true_negatives) as f64 / labels.len() as f64,
        probabilities: probabilities.to_vec(),
        predictions,
        confusion,
        report,
    })
}

/// Score a frozen classifier on normalized samples
pub fn evaluate<C: Classifier>(
    model: &C,
    samples: &[Sample],
    threshold: f64,
) -> PipelineResult<Evaluation> {
    let probabilities: Vec<f64> = samples
        .par_iter()
        .map(|s| model.predict_proba(&s.features))
        .collect();
    let labels: Vec<bool> = samples.iter().map(|s| s.label).collect();
    evaluate_probabilities(&probabilities, &labels, threshold)
}
