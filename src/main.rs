//! Login Anomaly Pipeline - Main Entry Point
//!
//! Runs the batch stages: generate synthetic users and logins, extract
//! features, then train, persist and evaluate both classifiers.
//!
//! Usage: `login-anomaly-pipeline [generate|features|train|all] [config-path]`

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use login_anomaly_pipeline::{
    config::{AppConfig, LoggingConfig},
    dataset::{
        read_feature_table, read_logins, read_users, write_feature_table, write_logins,
        write_users,
    },
    generator::anomaly_counts,
    EvaluationReporter, FeatureExtractor, LoginEvent, LoginEventSimulator, ModelLoader,
    ModelTrainingPipeline, User, UserPopulationGenerator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Generate,
    Features,
    Train,
    All,
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generate" => Ok(Stage::Generate),
            "features" => Ok(Stage::Features),
            "train" => Ok(Stage::Train),
            "all" => Ok(Stage::All),
            other => bail!("Unknown stage {other:?}, expected generate, features, train or all"),
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("login_anomaly_pipeline={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn load_config(path: Option<&String>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_path(path),
        None if Path::new("config/config.toml").exists() => AppConfig::load(),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let stage = match args.get(1) {
        Some(arg) => arg.parse()?,
        None => Stage::All,
    };
    let config = load_config(args.get(2))?;
    init_logging(&config.logging)?;

    info!(stage = ?stage, "Starting Login Anomaly Pipeline");

    // one reference instant per run keeps both generators on the same clock
    let now = config.generator.reference_instant(Utc::now());

    match stage {
        Stage::Generate => {
            let mut rng = StdRng::seed_from_u64(config.generator.seed);
            generate(&config, now, &mut rng)?;
        }
        Stage::Features => {
            let users = read_users(&config.paths.users_table())?;
            let events = read_logins(&config.paths.logins_table())?;
            extract_features(&config, &users, &events)?;
        }
        Stage::Train => {
            let pipeline = ModelTrainingPipeline::new(config.training.clone())?;
            let mut rng = StdRng::seed_from_u64(config.training.seed);
            train(&config, &pipeline, &mut rng)?;
        }
        Stage::All => {
            let pipeline = ModelTrainingPipeline::new(config.training.clone())?;
            let mut rng = StdRng::seed_from_u64(config.generator.seed);
            let (users, events) = generate(&config, now, &mut rng)?;
            extract_features(&config, &users, &events)?;
            train(&config, &pipeline, &mut rng)?;
        }
    }

    info!("Pipeline finished");
    Ok(())
}

fn generate(
    config: &AppConfig,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<(Vec<User>, Vec<LoginEvent>)> {
    let generator = &config.generator;
    info!(
        n_users = generator.n_users,
        n_logins = generator.n_logins,
        anomaly_rate = generator.anomaly_rate,
        seed = generator.seed,
        reference_time = %now.to_rfc3339(),
        "Generating synthetic data"
    );

    let users = UserPopulationGenerator::new(now).generate(generator.n_users, rng)?;
    let events = LoginEventSimulator::new(now)
        .with_mix(generator.anomaly_mix)
        .generate(&users, generator.n_logins, generator.anomaly_rate, rng)?;

    let positives = events.iter().filter(|e| e.is_anomalous()).count();
    let counts = anomaly_counts(&events);
    info!(
        users = users.len(),
        events = events.len(),
        positives,
        positive_rate = positives as f64 / events.len() as f64,
        mechanisms = ?counts,
        "Synthetic logins generated"
    );

    write_users(&config.paths.users_table(), &users)?;
    write_logins(&config.paths.logins_table(), &events)?;
    info!(
        users = %config.paths.users_table().display(),
        logins = %config.paths.logins_table().display(),
        "Synthetic tables written"
    );
    Ok((users, events))
}

fn extract_features(config: &AppConfig, users: &[User], events: &[LoginEvent]) -> Result<()> {
    let extractor = FeatureExtractor::new();
    info!(
        features = extractor.feature_count(),
        events = events.len(),
        "Extracting features"
    );
    let rows = extractor.extract(users, events)?;

    let path = config.paths.feature_table();
    write_feature_table(&path, &rows)?;
    info!(rows = rows.len(), path = %path.display(), "Feature table written");
    Ok(())
}

fn train(config: &AppConfig, pipeline: &ModelTrainingPipeline, rng: &mut StdRng) -> Result<()> {
    let path = config.paths.feature_table();
    let (table, cleaning) = read_feature_table(&path)
        .with_context(|| format!("Failed to read feature table {}", path.display()))?;
    info!(
        total = cleaning.total_rows,
        dropped = cleaning.dropped_rows,
        kept = cleaning.kept_rows(),
        "Feature table loaded"
    );

    let loader = ModelLoader::new(&config.paths.models_dir);
    let reporter = EvaluationReporter::new(&config.paths.reports_dir, &config.paths.images_dir);
    let outcome = pipeline.run(&table, rng, &loader, &reporter)?;

    for evaluation in &outcome.evaluations {
        info!(
            model = %evaluation.kind,
            roc_auc = %evaluation.roc_auc,
            pr_auc = %evaluation.pr_auc,
            "Test-set ranking quality"
        );
    }
    if let Err(reason) = &outcome.classification {
        warn!(reason = %reason, "Classification report skipped");
    }
    info!(
        train = outcome.train_rows,
        test = outcome.test_rows,
        test_positives = outcome.test_positives,
        models = %loader.models_dir().display(),
        report = %reporter.summary_path().display(),
        "Models and reports saved"
    );
    Ok(())
}
