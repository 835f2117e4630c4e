//! Versioned model artifacts
//!
//! An artifact is one JSON file holding everything inference needs: the
//! fitted normalization stats, the model weights, the feature settings and
//! the thresholds. The checksum covers the canonical JSON of the payload, so
//! any edit to the stored weights or stats is caught on load.

use super::dataset::NormalizationStats;
use super::features::{FeatureConfig, FEATURE_NAMES};
use super::model::StockoutModel;
use super::thresholds::ThresholdConfig;
use crate::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const ARTIFACT_VERSION: u32 = 1;

/// Default artifact location under the user data directory
pub fn default_model_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockguard")
        .join("model.json")
}

/// Everything restored into a predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub feature_names: Vec<String>,
    pub features: FeatureConfig,
    pub stats: NormalizationStats,
    pub model: StockoutModel,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// SHA-256 of the canonical payload JSON, lowercase hex
    pub checksum: String,
    pub payload: ArtifactPayload,
}

/// On-disk shape before the payload is trusted
#[derive(Deserialize)]
struct StoredArtifact {
    version: u32,
    model_id: Uuid,
    trained_at: DateTime<Utc>,
    checksum: String,
    payload: serde_json::Value,
}

fn checksum_of(payload: &serde_json::Value) -> String {
    // Value maps are key-sorted, which makes this independent of field order
    format!("{:x}", Sha256::digest(payload.to_string().as_bytes()))
}

impl ModelArtifact {
    pub fn new(
        features: FeatureConfig,
        stats: NormalizationStats,
        model: StockoutModel,
        thresholds: ThresholdConfig,
    ) -> PipelineResult<Self> {
        let payload = ArtifactPayload {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            features,
            stats,
            model,
            thresholds,
        };
        let value = serde_json::to_value(&payload)
            .map_err(|e| PipelineError::persistence("<memory>", format!("cannot encode payload: {e}")))?;

        Ok(Self {
            version: ARTIFACT_VERSION,
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            checksum: checksum_of(&value),
            payload,
        })
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::persistence(path, format!("cannot create directory: {e}")))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::persistence(path, format!("cannot encode artifact: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| PipelineError::persistence(path, format!("cannot write: {e}")))?;

        info!("Saved model {} to {}", self.model_id, path.display());
        Ok(())
    }

    /// Read and verify an artifact
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::persistence(path, format!("cannot read: {e}")))?;
        let stored: StoredArtifact = serde_json::from_str(&content)
            .map_err(|e| PipelineError::persistence(path, format!("malformed artifact: {e}")))?;

        if stored.version != ARTIFACT_VERSION {
            return Err(PipelineError::persistence(
                path,
                format!(
                    "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                    stored.version
                ),
            ));
        }

        let actual = checksum_of(&stored.payload);
        if actual != stored.checksum {
            return Err(PipelineError::persistence(
                path,
                format!("checksum mismatch: stored {}, computed {actual}", stored.checksum),
            ));
        }

        let payload: ArtifactPayload = serde_json::from_value(stored.payload)
            .map_err(|e| PipelineError::persistence(path, format!("malformed payload: {e}")))?;

        if payload.feature_names != FEATURE_NAMES {
            return Err(PipelineError::persistence(
                path,
                format!(
                    "feature mismatch: artifact has [{}], expected [{}]",
                    payload.feature_names.join(", "),
                    FEATURE_NAMES.join(", ")
                ),
            ));
        }
        if !payload.stats.is_valid() {
            return Err(PipelineError::persistence(path, "invalid normalization stats"));
        }
        if !payload.model.is_valid() {
            return Err(PipelineError::persistence(path, "invalid model parameters"));
        }

        debug!(
            "Loaded {:?} model {} trained at {}",
            payload.model.kind(),
            stored.model_id,
            stored.trained_at
        );
        Ok(Self {
            version: stored.version,
            model_id: stored.model_id,
            trained_at: stored.trained_at,
            checksum: stored.checksum,
            payload,
        })
    }
}
