//! Model bundle persistence

use crate::error::{PipelineError, Result};
use crate::models::bundle::{BundleRecord, ModelBundle, ModelKind};
use crate::storage::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reads and writes bundles as JSON files in one models directory
#[derive(Debug, Clone)]
pub struct ModelLoader {
    models_dir: PathBuf,
}

impl ModelLoader {
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self {
            models_dir: models_dir.as_ref().to_path_buf(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Where the bundle of `kind` lives
    pub fn path_for(&self, kind: ModelKind) -> PathBuf {
        self.models_dir.join(kind.file_name())
    }

    /// Persist a bundle, replacing any previous one of the same kind
    pub fn save(&self, bundle: &ModelBundle) -> Result<PathBuf> {
        let path = self.path_for(bundle.kind());
        let record = BundleRecord::from(bundle.clone());
        let json = serde_json::to_vec_pretty(&record).map_err(|e| {
            PipelineError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        write_atomic(&path, &json).map_err(|e| unreadable(&path, e))?;

        info!(model = %bundle.kind(), path = %path.display(), "Model bundle saved");
        Ok(path)
    }

    /// Load and validate the bundle of `kind`
    pub fn load(&self, kind: ModelKind) -> Result<ModelBundle> {
        let path = self.path_for(kind);
        let bytes = fs::read(&path).map_err(|e| unreadable(&path, e))?;
        let record: BundleRecord =
            serde_json::from_slice(&bytes).map_err(|e| PipelineError::Serialization {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let bundle = ModelBundle::try_from(record)?;
        if bundle.kind() != kind {
            return Err(PipelineError::DataIntegrity(format!(
                "{} holds a {} bundle, expected {}",
                path.display(),
                bundle.kind(),
                kind
            )));
        }

        info!(model = %kind, path = %path.display(), "Model bundle loaded");
        Ok(bundle)
    }

    /// Load every bundle present, skipping missing files
    pub fn load_all(&self) -> Result<Vec<ModelBundle>> {
        let mut bundles = Vec::new();
        for kind in ModelKind::ALL {
            let path = self.path_for(kind);
            if path.exists() {
                bundles.push(self.load(kind)?);
            } else {
                warn!(model = %kind, path = %path.display(), "Model bundle not found");
            }
        }

        if bundles.is_empty() {
            return Err(PipelineError::DataIntegrity(format!(
                "no model bundles found in {}",
                self.models_dir.display()
            )));
        }

        info!(
            count = bundles.len(),
            "Loaded {} bundles from {}",
            bundles.len(),
            self.models_dir.display()
        );
        Ok(bundles)
    }
}

/// Bundle file access failures are reported as serialization errors
fn unreadable(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Serialization {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureTable;
    use crate::models::bundle::canonical_features;
    use crate::models::{
        BoostingParams, GradientBoostedTrees, LogisticParams, LogisticRegression, StandardScaler,
    };
    use crate::types::FeatureRow;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn table() -> FeatureTable {
        FeatureTable::new(
            (0..80u32)
                .map(|i| {
                    let label = u8::from(i % 8 == 0);
                    let secs = if i % 5 == 0 { -1.0 } else { 37.5 * i as f64 };
                    FeatureRow::new(1 + i % 4 + 3 * label as u32, secs, i % 3 == 0, i % 6, label)
                        .unwrap()
                })
                .collect(),
        )
    }

    fn bundles() -> (ModelBundle, ModelBundle) {
        let data = table();
        let x = data.matrix(&canonical_features()).unwrap();
        let y = data.labels();
        let scaler = StandardScaler::fit(&x).unwrap();
        let linear = LogisticRegression::fit(
            &scaler.transform(&x).unwrap(),
            &y,
            &LogisticParams::default(),
        )
        .unwrap();
        let params = BoostingParams {
            n_estimators: 20,
            ..BoostingParams::default()
        };
        let trees =
            GradientBoostedTrees::fit(&x, &y, &params, &mut StdRng::seed_from_u64(5)).unwrap();
        (
            ModelBundle::linear(canonical_features(), scaler, linear).unwrap(),
            ModelBundle::ensemble(canonical_features(), trees).unwrap(),
        )
    }

    #[test]
    fn test_round_trip_predictions_identical() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path());
        let rows = table();

        for bundle in [bundles().0, bundles().1] {
            let path = loader.save(&bundle).unwrap();
            assert!(path.ends_with(bundle.kind().file_name()));

            let restored = loader.load(bundle.kind()).unwrap();
            assert_eq!(restored, bundle);

            let before = bundle.predict_proba(rows.rows()).unwrap();
            let after = restored.predict_proba(rows.rows()).unwrap();
            for (a, b) in before.iter().zip(after.iter()) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
        assert_eq!(loader.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_stripped_scaler_rejected() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path());
        let path = loader.save(&bundles().0).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json.as_object_mut().unwrap().remove("scaler");
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let err = loader.load(ModelKind::Linear).unwrap_err();
        assert!(matches!(err, PipelineError::InferencePrecondition(_)));
    }

    #[test]
    fn test_corrupt_bundle_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path());
        fs::write(loader.path_for(ModelKind::Ensemble), b"{\"kind\": \"ensemble\"").unwrap();

        let err = loader.load(ModelKind::Ensemble).unwrap_err();
        assert!(matches!(err, PipelineError::Serialization { .. }));
    }

    #[test]
    fn test_unreadable_bundle_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path());

        let err = loader.load(ModelKind::Linear).unwrap_err();
        assert!(matches!(err, PipelineError::Serialization { .. }));

        // a directory squatting on the bundle path cannot be replaced
        fs::create_dir(loader.path_for(ModelKind::Ensemble)).unwrap();
        fs::write(loader.path_for(ModelKind::Ensemble).join("inner"), b"x").unwrap();
        let err = loader.save(&bundles().1).unwrap_err();
        match err {
            PipelineError::Serialization { path, .. } => {
                assert_eq!(path, loader.path_for(ModelKind::Ensemble))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path());
        let path = loader.save(&bundles().1).unwrap();
        fs::copy(&path, loader.path_for(ModelKind::Linear)).unwrap();

        let err = loader.load(ModelKind::Linear).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn test_load_all_requires_a_bundle() {
        let dir = TempDir::new().unwrap();
        let err = ModelLoader::new(dir.path()).load_all().unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }
}
