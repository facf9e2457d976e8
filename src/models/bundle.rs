//! Self-contained model bundles
//!
//! A bundle pairs fitted parameters with the ordered feature list they were
//! trained on, and for the linear model the exact scaler it needs. Scoring
//! always goes through the bundle, so the linear model cannot be applied to
//! unscaled or differently scaled features.

use crate::dataset::feature_matrix;
use crate::error::{PipelineError, Result};
use crate::models::{GradientBoostedTrees, LogisticRegression, StandardScaler};
use crate::types::{FeatureRow, FEATURE_NAMES};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two trained model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Ensemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Linear, ModelKind::Ensemble];

    /// Human-readable name used in reports
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "Logistic Regression",
            ModelKind::Ensemble => "Gradient Boosted Trees",
        }
    }

    /// Bundle file name inside the models directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear_model.json",
            ModelKind::Ensemble => "ensemble_model.json",
        }
    }

    /// Short tag used for chart file names
    pub fn tag(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A trained model with everything needed to score feature rows
#[derive(Debug, Clone, PartialEq)]
pub enum ModelBundle {
    Linear {
        features: Vec<String>,
        scaler: StandardScaler,
        model: LogisticRegression,
    },
    Ensemble {
        features: Vec<String>,
        model: GradientBoostedTrees,
    },
}

/// Canonical ordered feature list
pub fn canonical_features() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

fn check_features(features: &[String]) -> Result<()> {
    if features.iter().map(String::as_str).ne(FEATURE_NAMES) {
        return Err(PipelineError::DataIntegrity(format!(
            "bundle feature list {features:?} differs from {FEATURE_NAMES:?}"
        )));
    }
    Ok(())
}

impl ModelBundle {
    /// Package a logistic model with the scaler it was trained under
    pub fn linear(
        features: Vec<String>,
        scaler: StandardScaler,
        model: LogisticRegression,
    ) -> Result<Self> {
        check_features(&features)?;
        scaler.validate()?;
        if scaler.fingerprint() != model.scaler_fingerprint() {
            return Err(PipelineError::InferencePrecondition(
                "scaler does not match the one the linear model was trained with".to_string(),
            ));
        }
        if scaler.n_features() != features.len() || model.coef().len() != features.len() {
            return Err(PipelineError::DataIntegrity(format!(
                "linear bundle sizes disagree: {} features, {} scaler columns, {} coefficients",
                features.len(),
                scaler.n_features(),
                model.coef().len()
            )));
        }
        Ok(ModelBundle::Linear {
            features,
            scaler,
            model,
        })
    }

    pub fn ensemble(features: Vec<String>, model: GradientBoostedTrees) -> Result<Self> {
        check_features(&features)?;
        model.validate()?;
        if model.n_features() != features.len() {
            return Err(PipelineError::DataIntegrity(format!(
                "ensemble bundle has {} features but the model expects {}",
                features.len(),
                model.n_features()
            )));
        }
        Ok(ModelBundle::Ensemble { features, model })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelBundle::Linear { .. } => ModelKind::Linear,
            ModelBundle::Ensemble { .. } => ModelKind::Ensemble,
        }
    }

    pub fn features(&self) -> &[String] {
        match self {
            ModelBundle::Linear { features, .. } | ModelBundle::Ensemble { features, .. } => {
                features
            }
        }
    }

    /// Probability of the anomalous class for each row
    pub fn predict_proba(&self, rows: &[FeatureRow]) -> Result<Array1<f64>> {
        let x = feature_matrix(rows, self.features())?;
        match self {
            ModelBundle::Linear { scaler, model, .. } => model.predict_proba(&scaler.transform(&x)?),
            ModelBundle::Ensemble { model, .. } => model.predict_proba(&x),
        }
    }
}

/// On-disk layout of a bundle
///
/// The scaler is optional here so a linear bundle missing it can be read and
/// then rejected with a precondition error instead of a parse failure.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum BundleRecord {
    Linear {
        features: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scaler: Option<StandardScaler>,
        model: LogisticRegression,
    },
    Ensemble {
        features: Vec<String>,
        model: GradientBoostedTrees,
    },
}

impl From<ModelBundle> for BundleRecord {
    fn from(bundle: ModelBundle) -> Self {
        match bundle {
            ModelBundle::Linear {
                features,
                scaler,
                model,
            } => BundleRecord::Linear {
                features,
                scaler: Some(scaler),
                model,
            },
            ModelBundle::Ensemble { features, model } => {
                BundleRecord::Ensemble { features, model }
            }
        }
    }
}

impl TryFrom<BundleRecord> for ModelBundle {
    type Error = PipelineError;

    fn try_from(record: BundleRecord) -> Result<Self> {
        match record {
            BundleRecord::Linear {
                features,
                scaler,
                model,
            } => {
                let scaler = scaler.ok_or_else(|| {
                    PipelineError::InferencePrecondition(
                        "linear bundle has no standardization transform".to_string(),
                    )
                })?;
                ModelBundle::linear(features, scaler, model)
            }
            BundleRecord::Ensemble { features, model } => ModelBundle::ensemble(features, model),
        }
    }
}
