//! Output reporters for stockguard results
//!
//! Supports two output formats:
//! - `text` - Terminal tables with colored risk levels
//! - `json` - Machine-readable JSON, the serving shape of predictions

mod json;
mod text;

use crate::classifier::{ClassificationReport, ConfusionMatrix, EpochStats, ModelKind};
use crate::models::PredictionResult;
use crate::pipeline::{DatasetStats, TrainingRun};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format '{}'. Valid formats: text, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Everything worth reporting about one training pass
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub model_kind: ModelKind,
    pub records: usize,
    pub train_size: usize,
    pub eval_size: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub final_train_loss: Option<f64>,
    pub final_val_loss: Option<f64>,
    pub threshold: f64,
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
    pub trace: Vec<EpochStats>,
    /// First held-out predictions, for a quick sanity check
    pub sample_predictions: Vec<PredictionResult>,
}

impl TrainingSummary {
    pub const SAMPLE_SIZE: usize = 10;

    pub fn from_run(run: &TrainingRun, records: usize) -> Self {
        let eval_size = run.holdout.len();
        Self {
            model_kind: run.predictor.model().kind(),
            records,
            train_size: records.saturating_sub(eval_size),
            eval_size,
            epochs_run: run.report.epochs_run,
            stopped_early: run.report.stopped_early,
            final_train_loss: run.report.final_train_loss(),
            final_val_loss: run.report.final_val_loss(),
            threshold: run.evaluation.threshold,
            accuracy: run.evaluation.accuracy,
            report: run.evaluation.report.clone(),
            confusion: run.evaluation.confusion,
            trace: run.report.trace.clone(),
            sample_predictions: run.holdout.iter().take(Self::SAMPLE_SIZE).cloned().collect(),
        }
    }
}

/// Render predictions in the specified format
pub fn render_predictions(results: &[PredictionResult], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::render_predictions(results)),
        OutputFormat::Json => json::render(&results),
    }
}

/// Render a training summary in the specified format
pub fn render_training(summary: &TrainingSummary, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::render_training(summary)),
        OutputFormat::Json => json::render(summary),
    }
}

/// Render dataset label statistics in the specified format
pub fn render_dataset_stats(stats: &DatasetStats, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::render_dataset_stats(stats)),
        OutputFormat::Json => json::render(stats),
    }
}
