//! End-to-end batch run: generate, extract, train, persist, report

use chrono::{TimeZone, Utc};
use login_anomaly_pipeline::config::{GeneratorConfig, PathsConfig, TrainingConfig};
use login_anomaly_pipeline::dataset::{
    read_feature_table, read_logins, read_users, write_feature_table, write_logins, write_users,
};
use login_anomaly_pipeline::models::BoostingParams;
use login_anomaly_pipeline::{
    EvaluationReporter, FeatureExtractor, LoginEventSimulator, ModelKind, ModelLoader,
    ModelTrainingPipeline, PipelineError, UserPopulationGenerator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use tempfile::TempDir;

fn quick_training() -> TrainingConfig {
    TrainingConfig {
        ensemble: BoostingParams {
            n_estimators: 40,
            ..BoostingParams::default()
        },
        ..TrainingConfig::default()
    }
}

#[test]
fn test_full_batch_run() {
    let dir = TempDir::new().unwrap();
    let paths = PathsConfig::default().rooted_at(dir.path());
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let pipeline = ModelTrainingPipeline::new(quick_training()).unwrap();

    // generate
    let users = UserPopulationGenerator::new(now)
        .generate(300, &mut rng)
        .unwrap();
    let events = LoginEventSimulator::new(now)
        .generate(&users, 6_000, 0.06, &mut rng)
        .unwrap();
    write_users(&paths.users_table(), &users).unwrap();
    write_logins(&paths.logins_table(), &events).unwrap();

    let users_back = read_users(&paths.users_table()).unwrap();
    let events_back = read_logins(&paths.logins_table()).unwrap();
    assert_eq!(users_back, users);
    assert_eq!(events_back.len(), events.len());
    for (read, written) in events_back.iter().zip(&events) {
        assert_eq!(read.user_id(), written.user_id());
        assert_eq!(read.login_time(), written.login_time());
        assert_eq!(read.device_id(), written.device_id());
        assert_eq!(read.country(), written.country());
        assert_eq!(read.ip_address(), written.ip_address());
        assert_eq!(read.label(), written.label());
    }

    // features
    let rows = FeatureExtractor::new().extract(&users_back, &events_back).unwrap();
    assert_eq!(rows.len(), events.len());
    write_feature_table(&paths.feature_table(), &rows).unwrap();
    let (table, cleaning) = read_feature_table(&paths.feature_table()).unwrap();
    assert_eq!(cleaning.dropped_rows, 0);
    assert_eq!(table.rows(), rows.as_slice());

    // train, persist, report
    let loader = ModelLoader::new(&paths.models_dir);
    let reporter = EvaluationReporter::new(&paths.reports_dir, &paths.images_dir);
    let outcome = pipeline.run(&table, &mut rng, &loader, &reporter).unwrap();

    assert_eq!(outcome.test_rows, 1_200);
    assert_eq!(outcome.train_rows + outcome.test_rows, table.len());
    for kind in ModelKind::ALL {
        let evaluation = outcome.evaluation(kind).unwrap();
        let auc = evaluation.roc_auc.value().unwrap();
        assert!((0.0..=1.0).contains(&auc));
        assert!(evaluation.pr_auc.value().is_some());
        assert!(reporter.chart_path(kind).exists());
        assert!(loader.path_for(kind).exists());
    }

    let summary = fs::read_to_string(reporter.summary_path()).unwrap();
    assert!(summary.starts_with("Logistic Regression AUC: "));
    assert!(summary.contains("\nGradient Boosted Trees AUC: "));
    assert!(summary.contains("=== Classification Report (Gradient Boosted Trees, 0.5 threshold) ==="));
    assert!(summary.contains("macro avg"));

    // reloaded bundles score identically
    let reloaded = loader.load_all().unwrap();
    assert_eq!(reloaded.len(), 2);
    let sample = &table.rows()[..100];
    for (original, restored) in [&outcome.linear, &outcome.ensemble].into_iter().zip(&reloaded) {
        assert_eq!(original.kind(), restored.kind());
        let a = original.predict_proba(sample).unwrap();
        let b = restored.predict_proba(sample).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}

#[test]
fn test_generation_reproducible() {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let run = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let users = UserPopulationGenerator::new(now)
            .generate(100, &mut rng)
            .unwrap();
        let events = LoginEventSimulator::new(now)
            .generate(&users, 500, 0.06, &mut rng)
            .unwrap();
        (users, events)
    };

    let (users_a, events_a) = run(11);
    let (users_b, events_b) = run(11);
    assert_eq!(users_a, users_b);
    assert_eq!(events_a, events_b);

    let (users_c, _) = run(12);
    assert_ne!(users_a, users_c);
}

#[test]
fn test_pinned_reference_time_gives_identical_tables() {
    let generator = GeneratorConfig {
        n_users: 80,
        n_logins: 400,
        reference_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        ..GeneratorConfig::default()
    };

    let run = || {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig::default().rooted_at(dir.path());
        let now = generator.reference_instant(Utc::now());
        let mut rng = StdRng::seed_from_u64(generator.seed);
        let users = UserPopulationGenerator::new(now)
            .generate(generator.n_users, &mut rng)
            .unwrap();
        let events = LoginEventSimulator::new(now)
            .with_mix(generator.anomaly_mix)
            .generate(&users, generator.n_logins, generator.anomaly_rate, &mut rng)
            .unwrap();
        write_users(&paths.users_table(), &users).unwrap();
        write_logins(&paths.logins_table(), &events).unwrap();
        (
            fs::read(paths.users_table()).unwrap(),
            fs::read(paths.logins_table()).unwrap(),
        )
    };

    let (users_a, logins_a) = run();
    let (users_b, logins_b) = run();
    assert_eq!(users_a, users_b);
    assert_eq!(logins_a, logins_b);
    assert!(!String::from_utf8(users_a).unwrap().contains('.'));
}

#[test]
fn test_incomplete_rows_are_dropped_and_counted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("features.csv");
    fs::write(
        &path,
        "user_unique_devices_to_date,secs_since_prev_login,is_geo_mismatch,logins_last_24h,label\n\
         1,-1,0,0,0\n\
         2,NA,1,0,1\n\
         3,120.5,1,,0\n\
         2,60,0,1,1\n",
    )
    .unwrap();

    let (table, cleaning) = read_feature_table(&path).unwrap();
    assert_eq!(cleaning.total_rows, 4);
    assert_eq!(cleaning.dropped_rows, 2);
    assert_eq!(table.len(), 2);
    assert_eq!(table.positives(), 1);
}

#[test]
fn test_too_few_rows_to_stratify() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("features.csv");
    fs::write(
        &path,
        "user_unique_devices_to_date,secs_since_prev_login,is_geo_mismatch,logins_last_24h,label\n\
         1,-1,0,0,0\n\
         1,30,0,1,0\n\
         1,45,0,2,0\n\
         2,NA,1,0,1\n\
         2,10,1,0,1\n",
    )
    .unwrap();

    let (table, cleaning) = read_feature_table(&path).unwrap();
    assert_eq!(cleaning.dropped_rows, 1);

    let pipeline = ModelTrainingPipeline::new(quick_training()).unwrap();
    let err = pipeline
        .train(&table, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, PipelineError::DataIntegrity(_)));
}
