//! Model registry
//!
//! Maps each supported model name to an untrained `StandardScaler -> classifier`
//! pipeline, and applies grid-search parameter combinations to pipelines.

use crate::error::{BakeoffError, Result};
use crate::optimizer::{ParamSet, ParameterValue};
use crate::preprocessing::StandardScaler;
use crate::training::{
    Criterion, DecisionTree, DistanceMetric, KNNClassifier, LogisticRegression, MaxFeatures, Model,
    Penalty, RandomForest, WeightScheme,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Step prefix used by parameter names in the configuration grids
pub const CLASSIFIER_PREFIX: &str = "classifier__";

/// The model types taking part in the bake-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "Logistic Regression")]
    LogisticRegression,
    #[serde(rename = "Random Forest")]
    RandomForest,
    #[serde(rename = "K-Nearest Neighbors")]
    KNearestNeighbors,
    #[serde(rename = "Decision Tree")]
    DecisionTree,
}

impl ModelKind {
    /// Registry order; results and reports follow it
    pub const ALL: [ModelKind; 4] = [
        ModelKind::LogisticRegression,
        ModelKind::RandomForest,
        ModelKind::KNearestNeighbors,
        ModelKind::DecisionTree,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::RandomForest => "Random Forest",
            ModelKind::KNearestNeighbors => "K-Nearest Neighbors",
            ModelKind::DecisionTree => "Decision Tree",
        }
    }

    /// File name stem for a persisted model, e.g. `Logistic_Regression_v1`
    pub fn file_stem(&self, version: &str) -> String {
        format!("{}_{}", self.display_name().replace(' ', "_"), version)
    }

    /// Position in registry order
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = BakeoffError;

    /// Accepts display names and snake_case aliases, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();

        match normalized.as_str() {
            "logistic_regression" => Ok(ModelKind::LogisticRegression),
            "random_forest" => Ok(ModelKind::RandomForest),
            "k_nearest_neighbors" | "knn" => Ok(ModelKind::KNearestNeighbors),
            "decision_tree" => Ok(ModelKind::DecisionTree),
            _ => Err(BakeoffError::UnknownModel(s.to_string())),
        }
    }
}

/// A classifier of one of the registered kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    KNearestNeighbors(KNNClassifier),
    DecisionTree(DecisionTree),
}

impl Classifier {
    /// Untrained classifier with default hyperparameters
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::LogisticRegression => Classifier::LogisticRegression(LogisticRegression::new()),
            ModelKind::RandomForest => Classifier::RandomForest(RandomForest::default()),
            ModelKind::KNearestNeighbors => Classifier::KNearestNeighbors(KNNClassifier::default()),
            ModelKind::DecisionTree => Classifier::DecisionTree(DecisionTree::new()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Classifier::LogisticRegression(_) => ModelKind::LogisticRegression,
            Classifier::RandomForest(_) => ModelKind::RandomForest,
            Classifier::KNearestNeighbors(_) => ModelKind::KNearestNeighbors,
            Classifier::DecisionTree(_) => ModelKind::DecisionTree,
        }
    }

    pub fn as_model(&self) -> &dyn Model {
        match self {
            Classifier::LogisticRegression(m) => m,
            Classifier::RandomForest(m) => m,
            Classifier::KNearestNeighbors(m) => m,
            Classifier::DecisionTree(m) => m,
        }
    }

    pub fn as_model_mut(&mut self) -> &mut dyn Model {
        match self {
            Classifier::LogisticRegression(m) => m,
            Classifier::RandomForest(m) => m,
            Classifier::KNearestNeighbors(m) => m,
            Classifier::DecisionTree(m) => m,
        }
    }

    /// Apply a full parameter combination; names are unprefixed
    fn apply(&mut self, params: &[(&str, &ParameterValue)]) -> Result<()> {
        match self {
            Classifier::LogisticRegression(m) => {
                for &(name, value) in params {
                    match name {
                        "C" => m.c = positive_f64(name, value)?,
                        "max_iter" => m.max_iter = usize_param(name, value)?,
                        "tol" => m.tol = positive_f64(name, value)?,
                        "fit_intercept" => m.fit_intercept = bool_param(name, value)?,
                        "penalty" => {
                            m.penalty = if value.is_null() {
                                Penalty::None
                            } else {
                                str_param(name, value)?.parse()?
                            }
                        }
                        _ => return Err(unknown_parameter(name, value, ModelKind::LogisticRegression)),
                    }
                }
            }
            Classifier::RandomForest(m) => {
                for &(name, value) in params {
                    match name {
                        "n_estimators" => m.n_estimators = usize_param(name, value)?,
                        "max_depth" => m.max_depth = optional_depth(name, value)?,
                        "min_samples_split" => m.min_samples_split = usize_param(name, value)?,
                        "min_samples_leaf" => m.min_samples_leaf = usize_param(name, value)?,
                        "max_features" => {
                            m.max_features = max_features_param(name, value)?.unwrap_or(MaxFeatures::All)
                        }
                        "bootstrap" => m.bootstrap = bool_param(name, value)?,
                        "criterion" => m.criterion = str_param(name, value)?.parse::<Criterion>()?,
                        "random_state" => m.random_state = optional_u64(name, value)?,
                        _ => return Err(unknown_parameter(name, value, ModelKind::RandomForest)),
                    }
                }
            }
            Classifier::DecisionTree(m) => {
                for &(name, value) in params {
                    match name {
                        "max_depth" => m.max_depth = optional_depth(name, value)?,
                        "min_samples_split" => m.min_samples_split = usize_param(name, value)?,
                        "min_samples_leaf" => m.min_samples_leaf = usize_param(name, value)?,
                        "max_features" => m.max_features = max_features_param(name, value)?,
                        "criterion" => m.criterion = str_param(name, value)?.parse::<Criterion>()?,
                        "random_state" => m.random_state = optional_u64(name, value)?,
                        _ => return Err(unknown_parameter(name, value, ModelKind::DecisionTree)),
                    }
                }
            }
            Classifier::KNearestNeighbors(m) => {
                // metric and p are resolved together
                let mut metric_name: Option<String> = None;
                let mut p: Option<f64> = None;

                for &(name, value) in params {
                    match name {
                        "n_neighbors" => m.config.n_neighbors = usize_param(name, value)?,
                        "weights" => m.config.weights = str_param(name, value)?.parse::<WeightScheme>()?,
                        "metric" => metric_name = Some(str_param(name, value)?.to_string()),
                        "p" => p = Some(positive_f64(name, value)?),
                        _ => return Err(unknown_parameter(name, value, ModelKind::KNearestNeighbors)),
                    }
                }

                if metric_name.is_some() || p.is_some() {
                    let current_p = match m.config.metric {
                        DistanceMetric::Euclidean => 2.0,
                        DistanceMetric::Manhattan => 1.0,
                        DistanceMetric::Minkowski(p) => p,
                    };
                    let name = metric_name.unwrap_or_else(|| "minkowski".to_string());
                    m.config.metric = DistanceMetric::from_name(&name, p.unwrap_or(current_p))?;
                }
            }
        }
        Ok(())
    }
}

fn unknown_parameter(name: &str, value: &ParameterValue, kind: ModelKind) -> BakeoffError {
    BakeoffError::invalid_parameter(name, value, format!("not a parameter of {}", kind))
}

fn usize_param(name: &str, value: &ParameterValue) -> Result<usize> {
    value
        .as_usize()
        .ok_or_else(|| BakeoffError::invalid_parameter(name, value, "expected a non-negative integer"))
}

fn optional_usize(name: &str, value: &ParameterValue) -> Result<Option<usize>> {
    if value.is_null() {
        Ok(None)
    } else {
        usize_param(name, value).map(Some)
    }
}

/// `null` means unlimited; a depth of 0 is rejected
fn optional_depth(name: &str, value: &ParameterValue) -> Result<Option<usize>> {
    match optional_usize(name, value)? {
        Some(0) => Err(BakeoffError::invalid_parameter(name, value, "must be at least 1 or null")),
        depth => Ok(depth),
    }
}

fn optional_u64(name: &str, value: &ParameterValue) -> Result<Option<u64>> {
    optional_usize(name, value).map(|v| v.map(|n| n as u64))
}

fn positive_f64(name: &str, value: &ParameterValue) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v > 0.0 && v.is_finite() => Ok(v),
        _ => Err(BakeoffError::invalid_parameter(name, value, "expected a positive number")),
    }
}

fn bool_param(name: &str, value: &ParameterValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| BakeoffError::invalid_parameter(name, value, "expected true or false"))
}

fn str_param<'a>(name: &str, value: &'a ParameterValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| BakeoffError::invalid_parameter(name, value, "expected a string"))
}

/// `null` means every feature
fn max_features_param(name: &str, value: &ParameterValue) -> Result<Option<MaxFeatures>> {
    match value {
        ParameterValue::Null => Ok(None),
        ParameterValue::Str(s) => match s.to_lowercase().as_str() {
            "sqrt" | "auto" => Ok(Some(MaxFeatures::Sqrt)),
            "log2" => Ok(Some(MaxFeatures::Log2)),
            _ => Err(BakeoffError::invalid_parameter(name, value, "expected 'sqrt' or 'log2'")),
        },
        ParameterValue::Int(n) if *n >= 1 => Ok(Some(MaxFeatures::Fixed(*n as usize))),
        ParameterValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(Some(MaxFeatures::Fraction(*f))),
        _ => Err(BakeoffError::invalid_parameter(
            name,
            value,
            "expected 'sqrt', 'log2', a positive integer, a fraction in (0, 1] or null",
        )),
    }
}

/// Standard scaler followed by a classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    scaler: StandardScaler,
    classifier: Classifier,
    fitted: bool,
}

impl Pipeline {
    /// Untrained pipeline with default hyperparameters
    pub fn new(kind: ModelKind) -> Self {
        Self {
            scaler: StandardScaler::new(),
            classifier: Classifier::new(kind),
            fitted: false,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.classifier.kind()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Untrained copy with a parameter combination applied
    ///
    /// Names may carry the `classifier__` step prefix. Unknown names and
    /// values of the wrong type are rejected.
    pub fn with_params(&self, params: &ParamSet) -> Result<Pipeline> {
        let stripped: Vec<(&str, &ParameterValue)> = params
            .iter()
            .map(|(name, value)| {
                (name.strip_prefix(CLASSIFIER_PREFIX).unwrap_or(name.as_str()), value)
            })
            .collect();

        let mut pipeline = Pipeline {
            scaler: StandardScaler::new(),
            classifier: self.classifier.clone(),
            fitted: false,
        };
        pipeline.classifier.apply(&stripped)?;
        Ok(pipeline)
    }

    /// Fit the scaler, then the classifier on the scaled data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let scaled = self.scaler.fit_transform(x)?;
        self.classifier.as_model_mut().fit(&scaled, y)?;
        self.fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(BakeoffError::ModelNotFitted);
        }
        let scaled = self.scaler.transform(x)?;
        self.classifier.as_model().predict(&scaled)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(BakeoffError::ModelNotFitted);
        }
        let scaled = self.scaler.transform(x)?;
        self.classifier.as_model().predict_proba(&scaled)
    }

    /// Accuracy on the given data
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        crate::training::accuracy_score(y, &y_pred)
    }
}

/// An untrained pipeline for each enabled model, in registry order
pub fn get_pipelines(enabled: &[ModelKind]) -> Vec<(ModelKind, Pipeline)> {
    ModelKind::ALL
        .iter()
        .filter(|kind| enabled.contains(kind))
        .map(|&kind| (kind, Pipeline::new(kind)))
        .collect()
}
