//! Integration test: Full bake-off (load → split → grid search → persist → select → reload)

use model_bakeoff::bakeoff::{run, RESULTS_FILE};
use model_bakeoff::config::AppConfig;
use model_bakeoff::export::ModelStore;
use model_bakeoff::optimizer::{ParamGrid, ParameterValue};
use model_bakeoff::registry::ModelKind;
use std::io::Write;
use std::path::Path;

fn seeded_config(model_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default().with_model_dir(Some(model_dir.to_path_buf()));
    config.cross_validation.random_state = Some(0);
    config
}

/// Small grids so the test suite stays fast
fn quick_config(model_dir: &Path) -> AppConfig {
    let mut config = seeded_config(model_dir);
    config.cross_validation.n_splits = 5;
    config.classifier_parameters.insert(
        "Random Forest".to_string(),
        ParamGrid::new()
            .with_values("classifier__n_estimators", vec![ParameterValue::Int(10)])
            .with_values("classifier__random_state", vec![ParameterValue::Int(1)]),
    );
    config
}

#[test]
fn test_full_bakeoff_with_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_config(dir.path());

    let summary = run(&config).unwrap();

    assert_eq!(summary.n_train, 120);
    assert_eq!(summary.n_test, 30);
    assert_eq!(summary.app_version, "1.4.5");
    assert_eq!(
        summary.results.keys().copied().collect::<Vec<_>>(),
        ModelKind::ALL.to_vec()
    );

    for result in summary.results.values() {
        assert!(result.best_cv_score > 0.8, "{}: {}", result.model, result.best_cv_score);
        assert!(result.test_accuracy > 0.8, "{}: {}", result.model, result.test_accuracy);
        assert_eq!(result.n_splits, 10);
        assert_eq!(result.n_candidates, 6);
        assert_eq!(result.cv_results.len(), 6);
        assert_eq!(result.saved_to.len(), 2);
    }

    // The winner holds the maximum CV score
    let winner = summary.winner().unwrap();
    let max = summary
        .results
        .values()
        .map(|r| r.best_cv_score)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(winner.best_cv_score, max);

    // Reloaded from disk with the same test accuracy
    assert_eq!(summary.reloaded_accuracy, Some(winner.test_accuracy));

    for kind in ModelKind::ALL {
        let stem = kind.file_stem("v1");
        assert!(dir.path().join(format!("{}.bin", stem)).exists());
        assert!(dir.path().join(format!("{}.json", stem)).exists());
    }
    assert!(dir.path().join("Logistic_Regression_v1.bin").exists());
    assert!(dir.path().join(RESULTS_FILE).exists());
}

#[test]
fn test_results_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let summary = run(&quick_config(dir.path())).unwrap();

    let text = std::fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    let best = summary.best_model.unwrap();
    assert_eq!(json["best_model"], best.display_name());
    assert!(json["results"]["Decision Tree"]["best_parameters"].is_object());
    assert_eq!(json["results"]["Random Forest"]["n_candidates"], 1);
    assert_eq!(json["n_test"], 30);
}

#[test]
fn test_only_enabled_models_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.models.insert("Random Forest".to_string(), false);
    config.models.insert("Logistic Regression".to_string(), false);

    let summary = run(&config).unwrap();

    assert_eq!(
        summary.results.keys().copied().collect::<Vec<_>>(),
        vec![ModelKind::KNearestNeighbors, ModelKind::DecisionTree]
    );
    assert!(!dir.path().join("Random_Forest_v1.bin").exists());
}

#[test]
fn test_no_models_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    for enabled in config.models.values_mut() {
        *enabled = false;
    }

    let summary = run(&config).unwrap();
    assert!(summary.results.is_empty());
    assert!(summary.best_model.is_none());
    assert!(summary.reloaded_accuracy.is_none());
}

#[test]
fn test_saving_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.saving.binary = false;
    config.saving.json = false;

    let summary = run(&config).unwrap();

    assert!(summary.results.values().all(|r| r.saved_to.is_empty()));
    assert!(summary.reloaded_accuracy.is_none());
    let store = ModelStore::new(dir.path(), vec![]);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_json_only_saving_reloads_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.saving.binary = false;

    let summary = run(&config).unwrap();
    let winner = summary.winner().unwrap();

    assert_eq!(winner.saved_to.len(), 1);
    assert_eq!(winner.saved_to[0].extension().unwrap(), "json");
    assert_eq!(summary.reloaded_accuracy, Some(winner.test_accuracy));
}

#[test]
fn test_unwritable_model_dir_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the model directory should be
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let summary = run(&quick_config(&blocked)).unwrap();

    assert_eq!(summary.results.len(), 4);
    assert!(summary.results.values().all(|r| r.saved_to.is_empty()));
    assert!(summary.best_model.is_some());
    assert!(summary.reloaded_accuracy.is_none());
}

#[test]
fn test_bakeoff_on_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("blobs.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    writeln!(file, "x1,x2,label").unwrap();
    for i in 0..30 {
        let d = (i % 10) as f64 * 0.05;
        writeln!(file, "{},{},left", d, 1.0 + d).unwrap();
        writeln!(file, "{},{},right", 5.0 + d, 6.0 - d).unwrap();
    }
    drop(file);

    let config = quick_config(&dir.path().join("models"))
        .with_data(Some(csv_path), Some("label".to_string()));
    let summary = run(&config).unwrap();

    assert_eq!(summary.n_train + summary.n_test, 60);
    assert_eq!(summary.n_test, 12);
    for result in summary.results.values() {
        assert_eq!(result.test_accuracy, 1.0, "{}", result.model);
    }

    let store = ModelStore::new(dir.path().join("models"), vec![]);
    let (_, metadata) = store.load("Decision_Tree_v1.bin").unwrap();
    assert_eq!(metadata.target_names, vec!["left", "right"]);
    assert_eq!(metadata.feature_names, vec!["x1", "x2"]);
}

#[test]
fn test_missing_target_column_fails() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("data.csv");
    std::fs::write(&csv_path, "a,b\n1,2\n3,4\n").unwrap();

    let config = quick_config(dir.path()).with_data(Some(csv_path), Some("species".to_string()));
    assert!(run(&config).is_err());
}
