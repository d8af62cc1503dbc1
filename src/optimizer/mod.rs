//! Hyperparameter optimization module
//!
//! Provides:
//! - Parameter grids deserialized from the configuration
//! - Exhaustive grid search scored by cross-validation

mod grid_search;
mod search_space;

pub use grid_search::{CandidateResult, GridSearchCV, GridSearchResult};
pub use search_space::{GridMap, ParamGrid, ParamSet, ParameterValue};
