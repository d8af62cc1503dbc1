//! Model bake-off - pick the best classifier for a labeled dataset
//!
//! Each enabled model is wrapped in a `StandardScaler -> classifier` pipeline,
//! tuned by an exhaustive grid search under stratified k-fold
//! cross-validation, scored on a hold-out split and saved to disk. The model
//! with the highest cross-validation score is reported as the winner.
//!
//! # Modules
//!
//! ## Core
//! - [`bakeoff`] - Tune, evaluate, persist and compare the enabled models
//! - [`optimizer`] - Parameter grids and cross-validated grid search
//! - [`registry`] - Model names and their pipelines
//!
//! ## ML building blocks
//! - [`training`] - Classifiers, cross-validation splitters and metrics
//! - [`preprocessing`] - Feature scaling
//!
//! ## I/O
//! - [`dataset`] - Dataset loading and train/test splitting
//! - [`config`] - JSON configuration
//! - [`export`] - Model persistence
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use model_bakeoff::prelude::*;
//!
//! let config = AppConfig::default();
//! let summary = run(&config)?;
//! if let Some(winner) = summary.winner() {
//!     println!("{}: {:.4}", winner.model, winner.best_cv_score);
//! }
//! # Ok::<(), model_bakeoff::BakeoffError>(())
//! ```

// Core error handling
pub mod error;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod optimizer;

// Bake-off
pub mod registry;
pub mod bakeoff;

// Data and configuration
pub mod config;
pub mod dataset;

// Utilities
pub mod export;
pub mod utils;

// Services
pub mod cli;

pub use error::{BakeoffError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{BakeoffError, Result};

    // Bake-off
    pub use crate::bakeoff::{best_model, run, test_models, BakeoffResults, ModelResult, RunSummary};
    pub use crate::registry::{get_pipelines, ModelKind, Pipeline};

    // Data and configuration
    pub use crate::config::AppConfig;
    pub use crate::dataset::Dataset;

    // Search
    pub use crate::optimizer::{GridSearchCV, GridSearchResult, ParamGrid, ParamSet, ParameterValue};

    // Training
    pub use crate::training::{CVStrategy, ClassificationMetrics, CrossValidator};

    // Persistence
    pub use crate::export::{ModelMetadata, ModelStore, SerializationFormat};
}
