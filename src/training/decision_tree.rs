//! Decision tree classifier (CART)

use crate::error::{BakeoffError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Shannon entropy (information gain)
    Entropy,
}

impl FromStr for Criterion {
    type Err = BakeoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            other => Err(BakeoffError::invalid_parameter(
                "criterion",
                other,
                "expected 'gini' or 'entropy'",
            )),
        }
    }
}

impl Criterion {
    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Strategy for the number of features examined per split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    /// Number of features examined per split, never less than one
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }

    fn validate(&self) -> Result<()> {
        match *self {
            MaxFeatures::Fixed(0) => Err(BakeoffError::invalid_parameter(
                "max_features",
                0,
                "must be at least 1",
            )),
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(
                BakeoffError::invalid_parameter("max_features", f, "fraction must be in (0, 1]"),
            ),
            _ => Ok(()),
        }
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered at each split, all when unset
    pub max_features: Option<MaxFeatures>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature subsampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Sorted class labels seen during fit
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Best split found for one feature: (feature, threshold, gain)
type SplitCandidate = (usize, f64, f64);

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
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

    /// Set the number of features considered per split
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
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
                "Cannot fit a decision tree on an empty dataset".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(BakeoffError::invalid_parameter(
                "max_depth",
                0,
                "must be at least 1",
            ));
        }
        if self.min_samples_split < 2 {
            return Err(BakeoffError::invalid_parameter(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(BakeoffError::invalid_parameter(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be at least 1",
            ));
        }
        if let Some(max_features) = &self.max_features {
            max_features.validate()?;
        }

        self.n_features = n_features;
        self.classes = unique_classes(y);
        let encoded = encode_labels(y, &self.classes);

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, &encoded, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn class_counts(&self, y: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[y[i]] += 1;
        }
        counts
    }

    fn make_leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let n = n_samples.max(1) as f64;
        TreeNode::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / n).collect(),
            n_samples,
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y, indices);
        let impurity = self.criterion.impurity(&counts, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || counts.iter().filter(|&&c| c > 0).count() <= 1;

        if should_stop {
            return self.make_leaf(&counts, n_samples);
        }

        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, impurity, rng)
        else {
            return self.make_leaf(&counts, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);

        importances[feature] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let n_features_to_try = self
            .max_features
            .map_or(n_features, |m| m.resolve(n_features));

        let mut features: Vec<usize> = if n_features_to_try < n_features {
            sample(rng, n_features, n_features_to_try).into_vec()
        } else {
            (0..n_features).collect()
        };
        features.sort_unstable();

        // Each feature independently finds its best threshold
        let feature_results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| self.best_split_for_feature(x, y, indices, feature_idx, parent_impurity))
            .collect();

        // First feature wins ties so fits are reproducible
        feature_results
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, cand| match best {
                Some(b) if b.2 >= cand.2 => Some(b),
                _ => Some(cand),
            })
    }

    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        feature_idx: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let n_classes = self.classes.len();

        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            x[[a, feature_idx]]
                .partial_cmp(&x[[b, feature_idx]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = vec![0usize; n_classes];
        for &i in &sorted {
            right_counts[y[i]] += 1;
        }

        let mut best_gain = 0.0f64;
        let mut best_threshold = None;

        // Sweep left to right, moving one sample at a time
        for pos in 0..n - 1 {
            let idx = sorted[pos];
            left_counts[y[idx]] += 1;
            right_counts[y[idx]] -= 1;

            let current = x[[idx, feature_idx]];
            let next = x[[sorted[pos + 1], feature_idx]];
            if next <= current {
                continue;
            }

            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                continue;
            }

            let weighted = (left_n as f64 * self.criterion.impurity(&left_counts, left_n)
                + right_n as f64 * self.criterion.impurity(&right_counts, right_n))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > best_gain {
                best_gain = gain;
                best_threshold = Some((current + next) / 2.0);
            }
        }

        best_threshold.map(|t| (feature_idx, t, best_gain))
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(BakeoffError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Class probabilities, one column per entry of `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.check_input(x)?;
        let n_classes = self.classes.len();

        let mut proba = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let dist = Self::leaf_distribution(root, row);
            for (j, &p) in dist.iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.check_input(x)?;

        let predictions: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| {
                let dist = Self::leaf_distribution(root, row);
                self.classes[argmax(dist)]
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn leaf_distribution<'a>(node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a [f64] {
        match node {
            TreeNode::Leaf { distribution, .. } => distribution,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    Self::leaf_distribution(left, sample)
                } else {
                    Self::leaf_distribution(right, sample)
                }
            }
        }
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth (a lone leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        match &self.root {
            None => 0,
            Some(node) => Self::node_depth(node),
        }
    }

    fn node_depth(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => {
                1 + Self::node_depth(left).max(Self::node_depth(right))
            }
        }
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        match &self.root {
            None => 0,
            Some(node) => Self::count_leaves(node),
        }
    }

    fn count_leaves(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                Self::count_leaves(left) + Self::count_leaves(right)
            }
        }
    }
}

/// Sorted distinct labels
pub(crate) fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();
    classes
}

/// Map each label to its position in `classes`
pub(crate) fn encode_labels(y: &Array1<f64>, classes: &[f64]) -> Vec<usize> {
    y.iter()
        .map(|v| {
            classes
                .iter()
                .position(|c| c == v)
                .unwrap_or_default()
        })
        .collect()
}

/// Index of the largest value; the first one wins ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
