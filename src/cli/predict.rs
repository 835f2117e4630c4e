//! Predict command - score a record snapshot with the saved model

use super::progress::ProgressObserver;
use super::write_output;
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use stockguard::classifier::thresholds::check_threshold;
use stockguard::classifier::ThresholdConfig;
use stockguard::config::PipelineConfig;
use stockguard::models::PredictionResult;
use stockguard::pipeline::{load_or_train, ModelOrigin};
use stockguard::reporters::{self, OutputFormat};
use stockguard::source::{JsonFileSource, RecordSource};

pub struct PredictOptions<'a> {
    pub records: &'a Path,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub top: Option<usize>,
    pub threshold: Option<f64>,
}

/// Highest probability first, keeping input order among ties
fn top_risks(mut results: Vec<PredictionResult>, top: usize) -> Vec<PredictionResult> {
    results.sort_by(|a, b| b.predicted_probability.total_cmp(&a.predicted_probability));
    results.truncate(top);
    results
}

/// Run the predict command
pub fn run(config: &PipelineConfig, opts: PredictOptions<'_>) -> Result<()> {
    let records = JsonFileSource::new(opts.records)
        .snapshot()
        .with_context(|| format!("Failed to read records from {}", opts.records.display()))?;

    let path = config.model_path();
    let mut progress = ProgressObserver::new(config.training.epochs);
    let (mut predictor, origin) = load_or_train(&path, &records, config, &mut progress)?;

    if let ModelOrigin::Retrained { reason } = &origin {
        eprintln!(
            "{} Model at {} was not usable ({}); retrained from {}",
            style("!").yellow().bold(),
            path.display(),
            reason,
            opts.records.display()
        );
    }

    if let Some(threshold) = opts.threshold {
        check_threshold(threshold)?;
        let thresholds = ThresholdConfig {
            threshold,
            ..predictor.thresholds().clone()
        };
        predictor = predictor.with_thresholds(thresholds);
    }

    let mut results = predictor.predict(&records)?;
    if let Some(top) = opts.top {
        results = top_risks(results, top);
    }

    let out = reporters::render_predictions(&results, opts.format)?;
    write_output(&out, opts.output.as_deref())
}
