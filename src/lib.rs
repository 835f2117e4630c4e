//! stockguard - Stockout risk prediction for grocery inventory
//!
//! Turns inventory snapshots into a trained binary classifier and per-item
//! stockout predictions:
//!
//! ```no_run
//! use stockguard::classifier::TracingObserver;
//! use stockguard::config::PipelineConfig;
//! use stockguard::pipeline::StockoutPredictor;
//! use stockguard::source::{JsonFileSource, RecordSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let records = JsonFileSource::new("inventory.json").snapshot()?;
//! let config = PipelineConfig::load(None)?;
//! let run = StockoutPredictor::train(&records, &config, &mut TracingObserver)?;
//! for result in run.predictor.predict(&records)? {
//!     println!("{} {:.2}", result.product_id, result.predicted_probability);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reporters;
pub mod source;

pub use error::{PipelineError, PipelineResult, Stage};
