//! Error types for the login anomaly pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the generation, training and reporting stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Out-of-range generator or training parameter, raised before any sampling
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input rows or tables that cannot be used as-is
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A metric that has no defined value for the given labels
    #[error("Metric {metric} is undefined: {reason}")]
    MetricUndefined { metric: &'static str, reason: String },

    /// Model bundle could not be encoded, decoded, read or written
    #[error("Serialization error for {}: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },

    /// Scoring was attempted without the preprocessing the model was trained with
    #[error("Inference precondition violated: {0}")]
    InferencePrecondition(String),

    /// File access failure outside model bundles
    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_error_message() {
        let err = PipelineError::MetricUndefined {
            metric: "roc_auc",
            reason: "no positive samples".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Metric roc_auc is undefined: no positive samples"
        );
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = PipelineError::io(
            "models/linear_model.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("models/linear_model.json"));
    }
}
