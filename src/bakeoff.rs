//! The model bake-off
//!
//! Every enabled model is tuned by grid search under stratified k-fold
//! cross-validation, evaluated on the hold-out split and persisted. The model
//! with the highest cross-validation score wins.

use crate::config::{AppConfig, SavingConfig};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::export::{ModelMetadata, ModelStore, SerializationFormat};
use crate::optimizer::{CandidateResult, GridSearchCV, ParamSet};
use crate::registry::{get_pipelines, ModelKind, Pipeline};
use crate::training::{CVStrategy, ClassificationMetrics, CrossValidator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// File the run summary is written to inside the model directory
pub const RESULTS_FILE: &str = "results.json";

/// Outcome of tuning and evaluating one model
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub model: ModelKind,
    pub best_parameters: ParamSet,
    pub best_cv_score: f64,
    pub cv_std: f64,
    pub test_accuracy: f64,
    pub n_candidates: usize,
    pub n_splits: usize,
    /// Wall time of the search including the refit
    pub fit_time_secs: f64,
    /// Test-set metrics of the refit best estimator
    pub metrics: ClassificationMetrics,
    pub cv_results: Vec<CandidateResult>,
    /// Files written by the store; empty when saving failed or is disabled
    pub saved_to: Vec<PathBuf>,
    #[serde(skip)]
    pub estimator: Pipeline,
}

/// Results keyed by model; iteration follows registry order
pub type BakeoffResults = BTreeMap<ModelKind, ModelResult>;

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub app_title: String,
    pub app_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub n_train: usize,
    pub n_test: usize,
    pub results: BakeoffResults,
    pub best_model: Option<ModelKind>,
    /// Test accuracy of the winner after reloading it from disk
    pub reloaded_accuracy: Option<f64>,
}

impl RunSummary {
    pub fn winner(&self) -> Option<&ModelResult> {
        self.best_model.and_then(|kind| self.results.get(&kind))
    }
}

/// Output formats selected by the `saving` section
pub fn formats_from(saving: &SavingConfig) -> Vec<SerializationFormat> {
    let mut formats = Vec::new();
    if saving.binary {
        formats.push(SerializationFormat::Binary);
    }
    if saving.json {
        formats.push(SerializationFormat::Json);
    }
    formats
}

fn cross_validator(config: &AppConfig) -> CrossValidator {
    let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
        n_splits: config.cross_validation.n_splits,
        shuffle: config.cross_validation.shuffle,
    });
    match config.cross_validation.random_state {
        Some(seed) => cv.with_random_state(seed),
        None => cv,
    }
}

/// Tune, evaluate and persist every enabled model
///
/// `dataset` must already be split. A model that cannot be saved is logged
/// and kept in the results.
pub fn test_models(dataset: &Dataset, config: &AppConfig, store: &ModelStore) -> Result<BakeoffResults> {
    let x_train = dataset.x_train()?;
    let y_train = dataset.y_train()?;
    let x_test = dataset.x_test()?;
    let y_test = dataset.y_test()?;

    let enabled = config.enabled_models()?;
    if enabled.is_empty() {
        warn!("No models enabled in the configuration");
    }

    let cv = cross_validator(config);
    let version = &config.output.model_version;
    let mut results = BakeoffResults::new();

    for (kind, pipeline) in get_pipelines(&enabled) {
        info!(model = %kind, "Training");
        let start = Instant::now();

        let search = GridSearchCV::new(pipeline, config.param_grid(kind)?, cv.clone());
        let search_result = search.fit(x_train, y_train)?;
        let fit_time_secs = start.elapsed().as_secs_f64();

        let y_pred = search_result.best_estimator.predict(x_test)?;
        let metrics = ClassificationMetrics::compute(y_test, &y_pred)?;
        let test_accuracy = metrics.accuracy;

        info!(
            model = %kind,
            best_params = %search_result.best_params,
            best_cv_score = search_result.best_score,
            test_accuracy,
            "Model evaluated"
        );

        let metadata = ModelMetadata::new(kind, version.clone())
            .with_features(dataset.feature_names().to_vec())
            .with_targets(dataset.target_names().to_vec())
            .with_params(&search_result.best_params)
            .add_metric("best_cv_score", search_result.best_score)
            .add_metric("cv_std", search_result.best_std())
            .add_metric("test_accuracy", test_accuracy)
            .add_metric("f1_macro", metrics.f1_macro);

        let saved_to = match store.save(&kind.file_stem(version), &search_result.best_estimator, &metadata) {
            Ok(paths) => paths,
            Err(e) => {
                error!(model = %kind, error = %e, "Failed to save model");
                Vec::new()
            }
        };

        results.insert(
            kind,
            ModelResult {
                model: kind,
                best_cv_score: search_result.best_score,
                cv_std: search_result.best_std(),
                best_parameters: search_result.best_params,
                test_accuracy,
                n_candidates: search_result.cv_results.len(),
                n_splits: search_result.n_splits,
                fit_time_secs,
                metrics,
                cv_results: search_result.cv_results,
                saved_to,
                estimator: search_result.best_estimator,
            },
        );
    }

    Ok(results)
}

/// Model with the strictly greatest cross-validation score
///
/// Ties keep the earlier model in registry order. NaN scores never win.
pub fn best_model(results: &BakeoffResults) -> Option<ModelKind> {
    let mut best: Option<ModelKind> = None;
    let mut best_score = f64::NEG_INFINITY;
    for (kind, result) in results {
        if result.best_cv_score > best_score {
            best_score = result.best_cv_score;
            best = Some(*kind);
        }
    }
    best
}

/// Reload the winner's persisted file and score it on the test split
fn reload_winner(store: &ModelStore, result: &ModelResult, dataset: &Dataset) -> Option<f64> {
    let path = result.saved_to.first()?;
    let reloaded = store
        .load(path)
        .and_then(|(pipeline, _)| pipeline.score(dataset.x_test()?, dataset.y_test()?));

    match reloaded {
        Ok(accuracy) => {
            if (accuracy - result.test_accuracy).abs() > 1e-12 {
                warn!(
                    path = %path.display(),
                    reloaded = accuracy,
                    expected = result.test_accuracy,
                    "Reloaded model does not reproduce its test accuracy"
                );
            } else {
                info!(path = %path.display(), "Reloaded best model");
            }
            Some(accuracy)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to reload best model");
            None
        }
    }
}

fn write_summary(store: &ModelStore, summary: &RunSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(store.dir())?;
    let path = store.dir().join(RESULTS_FILE);
    let file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    serde_json::to_writer_pretty(file, summary)?;
    Ok(path)
}

/// Run a complete bake-off as described by `config`
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    info!(
        "Application {} version {} started",
        config.app.app_title, config.app.app_version
    );

    let mut dataset = match &config.data.path {
        Some(path) => Dataset::load_csv(path, &config.data.target_column)?,
        None => Dataset::load_iris()?,
    };
    dataset.preprocess(
        config.split.test_size,
        config.split.random_state,
        config.split.stratify,
    )?;

    let store = ModelStore::new(config.output.model_dir.clone(), formats_from(&config.saving));
    let results = test_models(&dataset, config, &store)?;
    let best = best_model(&results);

    let mut reloaded_accuracy = None;
    match best.and_then(|kind| results.get(&kind)) {
        Some(winner) => {
            info!("Best model: {}", winner.model);
            info!("Best cross-validation score: {:.4}", winner.best_cv_score);
            info!("Best hyperparameters: {}", winner.best_parameters);
            info!("Test accuracy: {:.4}", winner.test_accuracy);
            reloaded_accuracy = reload_winner(&store, winner, &dataset);
        }
        None => warn!("No model produced a valid cross-validation score"),
    }

    let summary = RunSummary {
        app_title: config.app.app_title.clone(),
        app_version: config.app.app_version.clone(),
        started_at,
        finished_at: Utc::now(),
        n_train: dataset.x_train()?.nrows(),
        n_test: dataset.x_test()?.nrows(),
        results,
        best_model: best,
        reloaded_accuracy,
    };

    match write_summary(&store, &summary) {
        Ok(path) => info!(path = %path.display(), "Wrote run summary"),
        Err(e) => error!(error = %e, "Failed to write run summary"),
    }

    info!(
        "Application {} version {} finished",
        config.app.app_title, config.app.app_version
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn result_with_score(kind: ModelKind, score: f64) -> ModelResult {
        let y = array![0.0, 1.0];
        ModelResult {
            model: kind,
            best_parameters: ParamSet::new(),
            best_cv_score: score,
            cv_std: 0.0,
            test_accuracy: 1.0,
            n_candidates: 1,
            n_splits: 2,
            fit_time_secs: 0.0,
            metrics: ClassificationMetrics::compute(&y, &y).unwrap(),
            cv_results: Vec::new(),
            saved_to: Vec::new(),
            estimator: Pipeline::new(kind),
        }
    }

    fn results(scores: &[(ModelKind, f64)]) -> BakeoffResults {
        scores
            .iter()
            .map(|&(k, s)| (k, result_with_score(k, s)))
            .collect()
    }

    #[test]
    fn test_best_model_picks_max() {
        let r = results(&[
            (ModelKind::LogisticRegression, 0.95),
            (ModelKind::RandomForest, 0.97),
            (ModelKind::DecisionTree, 0.93),
        ]);
        assert_eq!(best_model(&r), Some(ModelKind::RandomForest));
    }

    #[test]
    fn test_best_model_tie_keeps_registry_order() {
        let r = results(&[
            (ModelKind::DecisionTree, 0.96),
            (ModelKind::KNearestNeighbors, 0.96),
        ]);
        assert_eq!(best_model(&r), Some(ModelKind::KNearestNeighbors));
    }

    #[test]
    fn test_best_model_ignores_nan() {
        let r = results(&[
            (ModelKind::LogisticRegression, f64::NAN),
            (ModelKind::DecisionTree, 0.5),
        ]);
        assert_eq!(best_model(&r), Some(ModelKind::DecisionTree));

        let all_nan = results(&[(ModelKind::LogisticRegression, f64::NAN)]);
        assert_eq!(best_model(&all_nan), None);
    }

    #[test]
    fn test_best_model_empty() {
        assert_eq!(best_model(&BakeoffResults::new()), None);
    }

    #[test]
    fn test_formats_from_saving() {
        let both = SavingConfig { binary: true, json: true };
        assert_eq!(
            formats_from(&both),
            vec![SerializationFormat::Binary, SerializationFormat::Json]
        );
        let none = SavingConfig { binary: false, json: false };
        assert!(formats_from(&none).is_empty());
    }

    #[test]
    fn test_models_requires_split() {
        let dataset = Dataset::load_iris().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), vec![]);
        assert!(test_models(&dataset, &AppConfig::default(), &store).is_err());
    }
}
