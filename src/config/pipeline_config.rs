//! Pipeline configuration (stockguard.toml)
//!
//! Example:
//! ```toml
//! [features]
//! stockout_horizon_days = 7
//! as_of = "2024-03-01"
//!
//! [training]
//! epochs = 80
//! learning_rate = 0.005
//!
//! [model]
//! kind = "logistic"
//!
//! [evaluation]
//! threshold = 0.4
//! ```

use crate::classifier::{
    default_model_path, FeatureConfig, FeatureDeriver, ModelConfig, SplitConfig, ThresholdConfig,
    TrainConfig,
};
use crate::error::{PipelineError, PipelineResult, Stage};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "stockguard.toml";

/// Environment variable overriding `[model].path`
pub const MODEL_PATH_ENV: &str = "STOCKGUARD_MODEL_PATH";

/// `[features]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSection {
    #[serde(flatten)]
    pub derive: FeatureConfig,
    /// Fixed reference date for lead time; today when unset
    pub as_of: Option<NaiveDate>,
}

/// `[model]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    #[serde(flatten)]
    pub model: ModelConfig,
    /// Artifact location
    pub path: Option<PathBuf>,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureSection,
    pub split: SplitConfig,
    pub training: TrainConfig,
    pub model: ModelSection,
    pub evaluation: ThresholdConfig,
}

impl PipelineConfig {
    /// Load with priority:
    /// 1. `explicit` path (must exist)
    /// 2. `stockguard.toml` in the working directory
    /// 3. Defaults
    ///
    /// `STOCKGUARD_MODEL_PATH` then overrides the model path.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Cannot determine working directory")?;
        let mut config = Self::load_from(explicit, &cwd)?;
        config.apply_model_path_override(std::env::var(MODEL_PATH_ENV).ok());
        Ok(config)
    }

    /// File lookup without environment overrides
    pub fn load_from(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let default_path = dir.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            return Self::from_file(&default_path);
        }

        debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_model_path_override(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|v| !v.trim().is_empty()) {
            self.model.path = Some(PathBuf::from(path));
        }
    }

    /// Check every section before any stage runs
    pub fn validate(&self) -> PipelineResult<()> {
        self.features.derive.validate()?;
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(PipelineError::data(
                Stage::Split,
                format!("test_fraction must be in (0, 1), got {}", self.split.test_fraction),
            ));
        }
        self.training.validate()?;
        if !(0.0..1.0).contains(&self.model.model.dropout) {
            return Err(PipelineError::data(
                Stage::Train,
                format!("dropout must be in [0, 1), got {}", self.model.model.dropout),
            ));
        }
        self.evaluation.validate()
    }

    pub fn model_path(&self) -> PathBuf {
        self.model.path.clone().unwrap_or_else(default_model_path)
    }

    /// Deriver for this configuration, anchored at `as_of` or today
    pub fn feature_deriver(&self) -> FeatureDeriver {
        match self.features.as_of {
            Some(date) => FeatureDeriver::new(self.features.derive.clone(), date),
            None => FeatureDeriver::today(self.features.derive.clone()),
        }
    }
}

const EXAMPLE_CONFIG: &str = r#"# stockguard configuration
# Every section is optional; the values below are the defaults.

[features]
# Rolling window (records) for average sales
rolling_window = 7
# Items whose runway is at most this many days are labeled stockouts
stockout_horizon_days = 7
# Days covered by sales_volume
sales_period_days = 30
# Runway used for items without sales
runway_cap_days = 365
# Fixed reference date for lead time (defaults to today)
# as_of = "2024-03-01"

[split]
test_fraction = 0.2
seed = 42

[training]
learning_rate = 0.001
batch_size = 32
epochs = 50
seed = 42

[model]
# "mlp" or "logistic"
kind = "mlp"
hidden_sizes = [64, 32]
dropout = 0.2
# path = "model.json"

[evaluation]
# Probabilities above this are predicted stockouts
threshold = 0.5
# Probabilities at or above this are high risk
high_risk_threshold = 0.8
"#;

/// Write an example `stockguard.toml` into `dir`
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(&path, EXAMPLE_CONFIG)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(path)
}
