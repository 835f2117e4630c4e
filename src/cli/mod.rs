//! CLI command definitions and handlers

mod init;
mod predict;
mod progress;
mod train;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use stockguard::classifier::ModelKind;
use stockguard::config::PipelineConfig;
use stockguard::reporters::OutputFormat;

/// Parse and validate a probability threshold (0-1)
fn parse_threshold(s: &str) -> Result<f64, String> {
    let t: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if (0.0..=1.0).contains(&t) {
        Ok(t)
    } else {
        Err("threshold must be between 0 and 1".to_string())
    }
}

/// stockguard - Stockout risk prediction for grocery inventory
#[derive(Parser, Debug)]
#[command(name = "stockguard")]
#[command(
    version,
    about = "Predict which inventory items are about to run out of stock",
    after_help = "\
Examples:
  stockguard init                                   Write an example stockguard.toml
  stockguard train inventory.json                   Train and save a model
  stockguard train inventory.json --stats           Show label statistics only
  stockguard predict inventory.json --top 10        Ten highest-risk items
  stockguard predict inventory.jsonl --format json  JSON output for scripting"
)]
pub struct Cli {
    /// Config file (default: ./stockguard.toml when present)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by train and predict
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Inventory records (JSON array, or JSON Lines with a .jsonl extension)
    pub records: PathBuf,

    /// Model artifact path (overrides config and STOCKGUARD_MODEL_PATH)
    #[arg(long, short = 'm')]
    pub model: Option<PathBuf>,

    /// Output format: text, json
    #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Output file path (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Decision threshold; probabilities above it are predicted stockouts
    #[arg(long, value_parser = parse_threshold)]
    pub threshold: Option<f64>,

    /// Reference date for lead time, YYYY-MM-DD (default: today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a stockguard.toml with the default settings
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing stockguard.toml
        #[arg(long)]
        force: bool,
    },

    /// Train a model on a record snapshot and save it
    #[command(after_help = "\
Examples:
  stockguard train inventory.json
  stockguard train inventory.json --epochs 100 --learning-rate 0.005
  stockguard train inventory.json --kind logistic --model models/logistic.json
  stockguard train inventory.json --as-of 2024-03-01 --format json")]
    Train {
        #[command(flatten)]
        common: CommonArgs,

        /// Training epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Adam learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Mini-batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Fraction of records held out for evaluation
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Seed for the split, weight init, shuffling and dropout
        #[arg(long)]
        seed: Option<u64>,

        /// Model family: mlp, logistic
        #[arg(long)]
        kind: Option<ModelKind>,

        /// Print dataset label statistics and exit
        #[arg(long)]
        stats: bool,

        /// Do not save the trained model
        #[arg(long)]
        no_save: bool,
    },

    /// Predict stockout risk for every record (retrains if no usable model)
    Predict {
        #[command(flatten)]
        common: CommonArgs,

        /// Show only the N highest-risk items
        #[arg(long)]
        top: Option<usize>,
    },
}

/// Print to stdout, or write to `output` when given
pub(crate) fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", style("✓").green(), style(path.display()).cyan());
        }
        None => println!("{content}"),
    }
    Ok(())
}

/// Load config and apply the flags shared by train and predict
fn load_config(path: Option<&Path>, common: &CommonArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path)?;
    if let Some(model) = &common.model {
        config.model.path = Some(model.clone());
    }
    if let Some(threshold) = common.threshold {
        config.evaluation.threshold = threshold;
    }
    if let Some(as_of) = common.as_of {
        config.features.as_of = Some(as_of);
    }
    Ok(config)
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path, force } => init::run(&path, force),

        Commands::Train {
            common,
            epochs,
            learning_rate,
            batch_size,
            test_fraction,
            seed,
            kind,
            stats,
            no_save,
        } => {
            let mut config = load_config(cli.config.as_deref(), &common)?;
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(lr) = learning_rate {
                config.training.learning_rate = lr;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(fraction) = test_fraction {
                config.split.test_fraction = fraction;
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
                config.split.seed = seed;
            }
            if let Some(kind) = kind {
                config.model.model.kind = kind;
            }

            train::run(
                &config,
                train::TrainOptions {
                    records: &common.records,
                    format: common.format.parse::<OutputFormat>()?,
                    output: common.output,
                    stats_only: stats,
                    no_save,
                },
            )
        }

        Commands::Predict { common, top } => {
            let config = load_config(cli.config.as_deref(), &common)?;
            predict::run(
                &config,
                predict::PredictOptions {
                    records: &common.records,
                    format: common.format.parse::<OutputFormat>()?,
                    output: common.output.clone(),
                    top,
                    threshold: common.threshold,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold("0.35"), Ok(0.35));
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("abc").is_err());
    }

    #[test]
    fn test_cli_parses_train_flags() {
        let cli = Cli::try_parse_from([
            "stockguard",
            "train",
            "records.json",
            "--epochs",
            "5",
            "--kind",
            "logistic",
            "--as-of",
            "2024-03-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Train {
                common, epochs, kind, ..
            } => {
                assert_eq!(common.records, PathBuf::from("records.json"));
                assert_eq!(epochs, Some(5));
                assert_eq!(kind, Some(ModelKind::Logistic));
                assert_eq!(common.as_of, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_format() {
        assert!(Cli::try_parse_from(["stockguard", "predict", "r.json", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
