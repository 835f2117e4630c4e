//! Error types for the stockout pipeline
//!
//! Every failure carries the pipeline stage it happened in and, where one
//! applies, the record that caused it.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Derive,
    Split,
    Normalize,
    Train,
    Evaluate,
    Predict,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest => write!(f, "ingest"),
            Stage::Derive => write!(f, "derive"),
            Stage::Split => write!(f, "split"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::Train => write!(f, "train"),
            Stage::Evaluate => write!(f, "evaluate"),
            Stage::Predict => write!(f, "predict"),
        }
    }
}

/// Errors that can occur while deriving, training, evaluating or persisting
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or insufficient input
    #[error("data error during {stage}{}: {message}", .record.as_ref().map(|r| format!(" (record {r})")).unwrap_or_default())]
    Data {
        stage: Stage,
        record: Option<String>,
        message: String,
    },

    /// Loss, gradient or validation loss became non-finite
    #[error("training diverged at epoch {epoch}, batch {batch}: loss = {loss}")]
    TrainingDiverged { epoch: usize, batch: usize, loss: f64 },

    /// Model artifact could not be read or written
    #[error("model artifact {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },
}

impl PipelineError {
    pub fn data(stage: Stage, message: impl Into<String>) -> Self {
        Self::Data {
            stage,
            record: None,
            message: message.into(),
        }
    }

    pub fn record(stage: Stage, record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Data {
            stage,
            record: Some(record.into()),
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Data and persistence errors can be retried with other input or
    /// recovered from by retraining. Divergence ends the training run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::TrainingDiverged { .. })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Data { stage, .. } => Some(*stage),
            Self::TrainingDiverged { .. } => Some(Stage::Train),
            Self::Persistence { .. } => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_record_context() {
        let err = PipelineError::record(Stage::Ingest, "SKU-7", "missing field `sales_volume`");
        assert_eq!(
            err.to_string(),
            "data error during ingest (record SKU-7): missing field `sales_volume`"
        );

        let err = PipelineError::data(Stage::Split, "need at least 2 records, got 1");
        assert_eq!(err.to_string(), "data error during split: need at least 2 records, got 1");
    }

    #[test]
    fn test_recoverability() {
        assert!(PipelineError::data(Stage::Derive, "x").is_recoverable());
        assert!(PipelineError::persistence("/tmp/m.json", "missing").is_recoverable());
        let diverged = PipelineError::TrainingDiverged {
            epoch: 3,
            batch: 1,
            loss: f64::NAN,
        };
        assert!(!diverged.is_recoverable());
        assert_eq!(diverged.stage(), Some(Stage::Train));
    }
}
