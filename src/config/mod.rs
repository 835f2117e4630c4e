//! Configuration module for stockguard
//!
//! This module handles:
//! - Pipeline configuration (stockguard.toml)
//! - Environment overrides for the model artifact path
//! - The example config written by `stockguard init`

mod pipeline_config;

pub use pipeline_config::{
    init_config, FeatureSection, ModelSection, PipelineConfig, CONFIG_FILE_NAME, MODEL_PATH_ENV,
};
