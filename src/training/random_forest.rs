//! Random Forest classifier

use super::decision_tree::{argmax, unique_classes, Criterion, DecisionTree, MaxFeatures};
use crate::error::{BakeoffError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Sorted class labels seen during fit
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Enable or disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(BakeoffError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(BakeoffError::ValidationError(
                "Cannot fit a random forest on an empty dataset".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(BakeoffError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }

        self.n_features = n_features;
        self.classes = unique_classes(y);

        // Per-tree seeds come from one master stream so a fixed random_state
        // reproduces the whole forest
        let mut master = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.gen()).collect();

        // Build trees in parallel
        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_sample = x.select(Axis(0), &sample_indices);
                let y_sample = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(self.max_features)
                    .with_criterion(self.criterion)
                    .with_random_state(rng.gen());
                tree.max_depth = self.max_depth;

                tree.fit(&x_sample, &y_sample)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut importances = Array1::<f64>::zeros(n_features);
        for tree in &trees {
            if let Some(imp) = tree.feature_importances() {
                importances += imp;
            }
        }
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }

        self.feature_importances = Some(importances);
        self.trees = trees;

        Ok(self)
    }

    /// Class probabilities averaged over all trees, one column per entry of `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(BakeoffError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_classes = self.classes.len();
        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| {
                let proba = tree.predict_proba(x)?;
                // A bootstrap sample may miss classes, so map tree columns onto forest columns
                let mut aligned = Array2::<f64>::zeros((x.nrows(), n_classes));
                for (j, class) in tree.classes().iter().enumerate() {
                    if let Some(col) = self.classes.iter().position(|c| c == class) {
                        aligned.column_mut(col).assign(&proba.column(j));
                    }
                }
                Ok(aligned)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array2::<f64>::zeros((x.nrows(), n_classes));
        for proba in &per_tree {
            sum += proba;
        }
        Ok(sum / self.trees.len() as f64)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let predictions: Vec<f64> = proba
            .rows()
            .into_iter()
            .map(|row| {
                let values: Vec<f64> = row.to_vec();
                self.classes[argmax(&values)]
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Number of fitted trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
