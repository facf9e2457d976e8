//! Login Anomaly Pipeline Library
//!
//! Simulates user login telemetry with controlled anomaly injection, derives
//! per-login features and trains a linear and a boosted-tree classifier to
//! score logins as normal or anomalous.

pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_extractor;
pub mod generator;
pub mod metrics;
pub mod models;
pub mod report;
pub mod storage;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use dataset::{CleaningReport, FeatureTable};
pub use error::{PipelineError, Result};
pub use feature_extractor::FeatureExtractor;
pub use generator::{AnomalyMix, LoginEventSimulator, UserPopulationGenerator};
pub use models::{ModelBundle, ModelKind, ModelLoader};
pub use report::EvaluationReporter;
pub use training::{ModelTrainingPipeline, TrainingOutcome};
pub use types::{AnomalyKind, FeatureRow, LoginEvent, User};
