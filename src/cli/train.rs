//! Train command - fit a stockout model on a record snapshot and save it

use super::progress::ProgressObserver;
use super::write_output;
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use stockguard::config::PipelineConfig;
use stockguard::pipeline::{dataset_stats, StockoutPredictor};
use stockguard::reporters::{self, OutputFormat, TrainingSummary};
use stockguard::source::{JsonFileSource, RecordSource};

pub struct TrainOptions<'a> {
    pub records: &'a Path,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub stats_only: bool,
    pub no_save: bool,
}

/// Run the train command
pub fn run(config: &PipelineConfig, opts: TrainOptions<'_>) -> Result<()> {
    let records = JsonFileSource::new(opts.records)
        .snapshot()
        .with_context(|| format!("Failed to read records from {}", opts.records.display()))?;

    if opts.stats_only {
        let stats = dataset_stats(&records, config)?;
        let out = reporters::render_dataset_stats(&stats, opts.format)?;
        return write_output(&out, opts.output.as_deref());
    }

    let mut progress = ProgressObserver::new(config.training.epochs);
    let run = StockoutPredictor::train(&records, config, &mut progress)?;

    if !opts.no_save {
        let path = config.model_path();
        let artifact = run
            .predictor
            .save(&path)
            .with_context(|| format!("Failed to save model to {}", path.display()))?;
        eprintln!(
            "{} Saved model {} to {}",
            style("✓").green(),
            artifact.model_id,
            style(path.display()).cyan()
        );
    }

    let summary = TrainingSummary::from_run(&run, records.len());
    let out = reporters::render_training(&summary, opts.format)?;
    write_output(&out, opts.output.as_deref())
}
