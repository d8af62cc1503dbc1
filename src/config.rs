//! Application configuration
//!
//! Loaded from a JSON file (`configs/config.json` by default). Every section
//! except `models` has defaults, so a minimal file only lists the models and
//! their parameter grids.

use crate::error::{BakeoffError, Result};
use crate::optimizer::{ParamGrid, ParameterValue};
use crate::registry::ModelKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.json";

/// Application name and version, logged at start and end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_title: String,
    pub app_version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            app_title: "Iris Model Bake-off".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Which formats each best model is persisted in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingConfig {
    /// Checksummed bincode file (`.bin`)
    #[serde(default = "default_true", alias = "pkl")]
    pub binary: bool,
    /// Pretty-printed JSON file (`.json`)
    #[serde(default = "default_true", alias = "job")]
    pub json: bool,
}

impl Default for SavingConfig {
    fn default() -> Self {
        Self {
            binary: true,
            json: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    pub n_splits: usize,
    pub shuffle: bool,
    /// Unseeded when absent
    pub random_state: Option<u64>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            n_splits: 10,
            shuffle: true,
            random_state: None,
        }
    }
}

/// Hold-out split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub random_state: u64,
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
            stratify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV file; the bundled iris data when absent
    pub path: Option<PathBuf>,
    pub target_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            target_column: "species".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub model_dir: PathBuf,
    /// Suffix of persisted file names, e.g. `v1` in `Decision_Tree_v1.bin`
    pub model_version: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            model_version: "v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Full application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppInfo,
    #[serde(default)]
    pub saving: SavingConfig,
    /// Model display name -> enabled
    pub models: BTreeMap<String, bool>,
    /// Model display name -> parameter grid
    #[serde(default, alias = "classifier_Parameters")]
    pub classifier_parameters: BTreeMap<String, ParamGrid>,
    #[serde(default)]
    pub cross_validation: CrossValidationConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    /// All four models enabled with the shipped grids
    fn default() -> Self {
        let models = ModelKind::ALL
            .iter()
            .map(|k| (k.display_name().to_string(), true))
            .collect();

        let int = |v: i64| ParameterValue::Int(v);
        let s = |v: &str| ParameterValue::Str(v.to_string());

        let mut classifier_parameters = BTreeMap::new();
        classifier_parameters.insert(
            ModelKind::LogisticRegression.display_name().to_string(),
            ParamGrid::new()
                .with_values("classifier__C", vec![ParameterValue::Float(0.1), ParameterValue::Float(1.0), ParameterValue::Float(10.0)])
                .with_values("classifier__max_iter", vec![int(100), int(200)]),
        );
        classifier_parameters.insert(
            ModelKind::RandomForest.display_name().to_string(),
            ParamGrid::new()
                .with_values("classifier__n_estimators", vec![int(50), int(100)])
                .with_values("classifier__max_depth", vec![ParameterValue::Null, int(5), int(10)]),
        );
        classifier_parameters.insert(
            ModelKind::KNearestNeighbors.display_name().to_string(),
            ParamGrid::new()
                .with_values("classifier__n_neighbors", vec![int(3), int(5), int(7)])
                .with_values("classifier__weights", vec![s("uniform"), s("distance")]),
        );
        classifier_parameters.insert(
            ModelKind::DecisionTree.display_name().to_string(),
            ParamGrid::new()
                .with_values("classifier__max_depth", vec![ParameterValue::Null, int(3), int(5)])
                .with_values("classifier__criterion", vec![s("gini"), s("entropy")]),
        );

        Self {
            app: AppInfo::default(),
            saving: SavingConfig::default(),
            models,
            classifier_parameters,
            cross_validation: CrossValidationConfig::default(),
            split: SplitConfig::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeoffError::ConfigError(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content).map_err(|e| match e {
            BakeoffError::ConfigError(msg) => {
                BakeoffError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)
            .map_err(|e| BakeoffError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Enabled models in registry order
    pub fn enabled_models(&self) -> Result<Vec<ModelKind>> {
        let mut enabled = Vec::new();
        for (name, &on) in &self.models {
            let kind: ModelKind = name
                .parse()
                .map_err(|_| BakeoffError::ConfigError(format!("Unknown model '{}' in models", name)))?;
            if on && !enabled.contains(&kind) {
                enabled.push(kind);
            }
        }
        enabled.sort_by_key(|k| k.index());
        Ok(enabled)
    }

    /// Parameter grid configured for a model
    pub fn param_grid(&self, kind: ModelKind) -> Result<ParamGrid> {
        self.classifier_parameters
            .iter()
            .find(|(name, _)| name.parse::<ModelKind>().ok() == Some(kind))
            .map(|(_, grid)| grid.clone())
            .ok_or_else(|| {
                BakeoffError::ConfigError(format!(
                    "No parameter grid configured for '{}'",
                    kind.display_name()
                ))
            })
    }

    /// Check value ranges and that every enabled model has a grid
    pub fn validate(&self) -> Result<()> {
        if self.cross_validation.n_splits < 2 {
            return Err(BakeoffError::ConfigError(format!(
                "cross_validation.n_splits must be at least 2, got {}",
                self.cross_validation.n_splits
            )));
        }
        let test_size = self.split.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(BakeoffError::ConfigError(format!(
                "split.test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        if self.output.model_version.trim().is_empty() {
            return Err(BakeoffError::ConfigError(
                "output.model_version must not be empty".to_string(),
            ));
        }
        for kind in self.enabled_models()? {
            self.param_grid(kind)?;
        }
        Ok(())
    }

    /// Apply a CLI `--data` / `--target` override
    pub fn with_data(mut self, path: Option<PathBuf>, target_column: Option<String>) -> Self {
        if path.is_some() {
            self.data.path = path;
        }
        if let Some(target) = target_column {
            self.data.target_column = target;
        }
        self
    }

    /// Apply a CLI `--model-dir` override
    pub fn with_model_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output.model_dir = dir;
        }
        self
    }
}
