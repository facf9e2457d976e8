//! Classifiers, preprocessing and model bundles

pub mod boosting;
pub mod bundle;
pub mod loader;
pub mod logistic;
pub mod scaler;

pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use bundle::{canonical_features, ModelBundle, ModelKind};
pub use loader::ModelLoader;
pub use logistic::{LogisticParams, LogisticRegression};
pub use scaler::{StandardScaler, Standardized};
