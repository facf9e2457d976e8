//! Model training and evaluation over a clean feature table

use crate::config::TrainingConfig;
use crate::dataset::{stratified_split, FeatureTable, Split};
use crate::error::Result;
use crate::metrics::{precision_recall_curve, roc_auc, ClassificationReport};
use crate::models::{
    canonical_features, GradientBoostedTrees, LogisticRegression, ModelBundle, ModelKind,
    ModelLoader, StandardScaler,
};
use crate::report::{
    EvaluationReporter, MetricValue, ModelEvaluation, ReportArtifacts, ThresholdReport,
};
use ndarray::Array1;
use rand::Rng;
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything one training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_positives: usize,
    pub linear: ModelBundle,
    pub ensemble: ModelBundle,
    /// Linear first, then ensemble
    pub evaluations: Vec<ModelEvaluation>,
    /// Ensemble report at the decision threshold, or why it was skipped
    pub classification: std::result::Result<ClassificationReport, String>,
    pub decision_threshold: f64,
}

impl TrainingOutcome {
    pub fn evaluation(&self, kind: ModelKind) -> Option<&ModelEvaluation> {
        self.evaluations.iter().find(|e| e.kind == kind)
    }

    pub fn threshold_report(&self) -> ThresholdReport<'_> {
        ThresholdReport {
            kind: ModelKind::Ensemble,
            threshold: self.decision_threshold,
            report: self.classification.as_ref().map_err(String::as_str),
        }
    }
}

/// Paths written by [`ModelTrainingPipeline::persist`]
#[derive(Debug, Clone)]
pub struct PersistedRun {
    pub bundles: Vec<PathBuf>,
    pub reports: ReportArtifacts,
}

/// Split, fit both classifiers and score them on the held-out rows
#[derive(Debug, Clone)]
pub struct ModelTrainingPipeline {
    config: TrainingConfig,
}

impl ModelTrainingPipeline {
    /// Validates every parameter up front
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Stratified train/test partition
    pub fn split<R: Rng + ?Sized>(&self, table: &FeatureTable, rng: &mut R) -> Result<Split> {
        stratified_split(table, self.config.test_fraction, rng)
    }

    /// Standardize on the training rows, then fit the balanced logistic model
    pub fn fit_linear(&self, train: &FeatureTable) -> Result<ModelBundle> {
        let features = canonical_features();
        let x = train.matrix(&features)?;
        let scaler = StandardScaler::fit(&x)?;
        let model =
            LogisticRegression::fit(&scaler.transform(&x)?, &train.labels(), &self.config.linear)?;
        info!(
            n_iter = model.n_iter(),
            intercept = model.intercept(),
            "Linear model fitted"
        );
        ModelBundle::linear(features, scaler, model)
    }

    /// Fit boosted trees on raw features
    pub fn fit_ensemble<R: Rng + ?Sized>(
        &self,
        train: &FeatureTable,
        rng: &mut R,
    ) -> Result<ModelBundle> {
        let features = canonical_features();
        let x = train.matrix(&features)?;
        let model = GradientBoostedTrees::fit(&x, &train.labels(), &self.config.ensemble, rng)?;
        info!(trees = model.n_trees(), "Ensemble model fitted");
        ModelBundle::ensemble(features, model)
    }

    /// Score a bundle on the test rows; undefined metrics are recorded as skipped
    pub fn evaluate(
        &self,
        bundle: &ModelBundle,
        test: &FeatureTable,
    ) -> Result<(Array1<f64>, ModelEvaluation)> {
        let scores = bundle.predict_proba(test.rows())?;
        let labels = test.labels();

        let roc = MetricValue::from(roc_auc(&labels, &scores));
        let (pr_auc, pr_curve) = match precision_recall_curve(&labels, &scores) {
            Ok(curve) => (MetricValue::from(curve.area()), Some(curve)),
            Err(e) => (MetricValue::Skipped(e.to_string()), None),
        };

        match (&roc, &pr_auc) {
            (MetricValue::Value(roc), MetricValue::Value(pr)) => {
                info!(model = %bundle.kind(), roc_auc = roc, pr_auc = pr, "Model evaluated");
            }
            _ => warn!(model = %bundle.kind(), roc_auc = %roc, pr_auc = %pr_auc, "Metric skipped"),
        }

        Ok((
            scores,
            ModelEvaluation {
                kind: bundle.kind(),
                roc_auc: roc,
                pr_auc,
                pr_curve,
            },
        ))
    }

    /// Split, fit and evaluate; RNG use is the split followed by the ensemble fit
    pub fn train<R: Rng + ?Sized>(
        &self,
        table: &FeatureTable,
        rng: &mut R,
    ) -> Result<TrainingOutcome> {
        info!(
            rows = table.len(),
            positives = table.positives(),
            "Starting model training"
        );
        let split = self.split(table, rng)?;

        let linear = self.fit_linear(&split.train)?;
        let ensemble = self.fit_ensemble(&split.train, rng)?;

        let (_, linear_eval) = self.evaluate(&linear, &split.test)?;
        let (ensemble_scores, ensemble_eval) = self.evaluate(&ensemble, &split.test)?;

        let classification = ClassificationReport::at_threshold(
            &split.test.labels(),
            &ensemble_scores,
            self.config.decision_threshold,
        )
        .map_err(|e| e.to_string());
        if let Ok(report) = &classification {
            info!(
                threshold = self.config.decision_threshold,
                precision = report.positive().precision,
                recall = report.positive().recall,
                f1 = report.positive().f1_score,
                "Ensemble classification report"
            );
        }

        Ok(TrainingOutcome {
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            test_positives: split.test.positives(),
            linear,
            ensemble,
            evaluations: vec![linear_eval, ensemble_eval],
            classification,
            decision_threshold: self.config.decision_threshold,
        })
    }

    /// Save both bundles, then write the summary and charts
    pub fn persist(
        &self,
        outcome: &TrainingOutcome,
        loader: &ModelLoader,
        reporter: &EvaluationReporter,
    ) -> Result<PersistedRun> {
        let bundles = vec![loader.save(&outcome.linear)?, loader.save(&outcome.ensemble)?];
        let reports = reporter.write(&outcome.evaluations, &outcome.threshold_report())?;
        Ok(PersistedRun { bundles, reports })
    }

    /// Train, persist and report in one call
    pub fn run<R: Rng + ?Sized>(
        &self,
        table: &FeatureTable,
        rng: &mut R,
        loader: &ModelLoader,
        reporter: &EvaluationReporter,
    ) -> Result<TrainingOutcome> {
        let outcome = self.train(table, rng)?;
        self.persist(&outcome, loader, reporter)?;
        Ok(outcome)
    }
}
