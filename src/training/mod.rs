//! Model training module
//!
//! The classifiers compared by the bake-off:
//! - Logistic regression (multinomial, L2)
//! - Decision trees and Random Forests
//! - K-Nearest Neighbors
//!
//! plus cross-validation splitters and classification metrics.

mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod knn;
pub mod linear_models;
pub mod random_forest;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, MaxFeatures, TreeNode};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use linear_models::{LogisticRegression, Penalty};
pub use models::{accuracy_score, class_key, ClassificationMetrics, Model};
pub use random_forest::RandomForest;
