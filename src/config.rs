//! Configuration management for the login anomaly pipeline

use crate::error::{PipelineError, Result as PipelineResult};
use crate::generator::AnomalyMix;
use crate::models::{BoostingParams, LogisticParams};
use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub training: TrainingConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Synthetic population and login generation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Seed for the single run-wide RNG
    pub seed: u64,
    pub n_users: usize,
    pub n_logins: usize,
    /// Fraction of logins that receive an anomaly
    pub anomaly_rate: f64,
    /// Relative weight of each anomaly mechanism
    pub anomaly_mix: AnomalyMix,
    /// RFC 3339 instant standing in for "now"; unset means the wall clock
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_users: 20_000,
            n_logins: 200_000,
            anomaly_rate: 0.06,
            anomaly_mix: AnomalyMix::default(),
            reference_time: None,
        }
    }
}

impl GeneratorConfig {
    /// The configured reference time, or `now`, at whole-second resolution
    pub fn reference_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.reference_time.unwrap_or(now).trunc_subsecs(0)
    }
}

/// Split, model hyperparameters and the report threshold
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed used when the training stage runs on its own
    pub seed: u64,
    pub test_fraction: f64,
    /// Probability at or above which a login is classified as anomalous
    pub decision_threshold: f64,
    pub linear: LogisticParams,
    pub ensemble: BoostingParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            decision_threshold: 0.5,
            linear: LogisticParams::default(),
            ensemble: BoostingParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Check every training parameter before any data is touched
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "training.test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(PipelineError::InvalidParameter(format!(
                "training.decision_threshold must lie in [0, 1], got {}",
                self.decision_threshold
            )));
        }
        self.linear.validate()?;
        self.ensemble.validate()
    }
}

/// Output locations, relative to the working directory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            reports_dir: PathBuf::from("reports"),
            images_dir: PathBuf::from("images"),
        }
    }
}

impl PathsConfig {
    pub fn users_table(&self) -> PathBuf {
        self.data_dir.join("users.csv")
    }

    pub fn logins_table(&self) -> PathBuf {
        self.data_dir.join("synthetic_logins.csv")
    }

    pub fn feature_table(&self) -> PathBuf {
        self.data_dir.join("features.csv")
    }

    /// Resolve relative directories against `root`
    pub fn rooted_at(&self, root: &Path) -> Self {
        Self {
            data_dir: root.join(&self.data_dir),
            models_dir: root.join(&self.models_dir),
            reports_dir: root.join(&self.reports_dir),
            images_dir: root.join(&self.images_dir),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generator.seed, 42);
        assert_eq!(config.generator.n_users, 20_000);
        assert_eq!(config.generator.n_logins, 200_000);
        assert_eq!(config.generator.anomaly_rate, 0.06);
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.training.ensemble.n_estimators, 300);
        assert_eq!(config.training.linear.max_iter, 200);
        assert_eq!(config.paths.models_dir, PathBuf::from("models"));
        assert_eq!(config.logging.format, "pretty");
        assert!(config.generator.reference_time.is_none());
        config.training.validate().unwrap();
    }

    #[test]
    fn test_reference_instant_whole_seconds() {
        let mut generator = GeneratorConfig::default();
        let now = Utc
            .with_ymd_and_hms(2024, 3, 16, 11, 35, 6)
            .unwrap()
            .with_nanosecond(301_264_546)
            .unwrap();
        assert_eq!(
            generator.reference_instant(now),
            Utc.with_ymd_and_hms(2024, 3, 16, 11, 35, 6).unwrap()
        );

        let pinned = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        generator.reference_time = Some(pinned);
        assert_eq!(generator.reference_instant(now), pinned);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[generator]
n_users = 50
anomaly_rate = 0.1
reference_time = "2024-06-01T12:00:00Z"

[generator.anomaly_mix]
new_device = 1.0
improbable_geo = 0.0
rapid_succession = 0.0

[training.ensemble]
n_estimators = 25

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.generator.n_users, 50);
        assert_eq!(config.generator.n_logins, 200_000);
        assert_eq!(config.generator.anomaly_rate, 0.1);
        assert_eq!(config.generator.anomaly_mix.new_device, 1.0);
        assert_eq!(
            config.generator.reference_time,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(config.training.ensemble.n_estimators, 25);
        assert_eq!(config.training.ensemble.max_depth, 4);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load_from_path("does/not/exist.toml").is_err());
    }

    #[test]
    fn test_training_validation() {
        let mut training = TrainingConfig::default();
        training.decision_threshold = 1.5;
        assert!(matches!(
            training.validate(),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_paths() {
        let paths = PathsConfig::default().rooted_at(Path::new("/tmp/run"));
        assert_eq!(paths.feature_table(), PathBuf::from("/tmp/run/data/features.csv"));
        assert_eq!(
            paths.logins_table(),
            PathBuf::from("/tmp/run/data/synthetic_logins.csv")
        );
    }
}
