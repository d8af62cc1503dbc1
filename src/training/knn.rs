//! K-Nearest Neighbors classifier
//!
//! Stores the training set and predicts by (optionally distance weighted)
//! majority vote among the `n_neighbors` closest training rows.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

use super::decision_tree::{argmax, unique_classes};
use crate::error::{BakeoffError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

impl DistanceMetric {
    /// Parse a metric name; `p` only matters for `minkowski`
    pub fn from_name(name: &str, p: f64) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "manhattan" | "l1" | "cityblock" => Ok(Self::Manhattan),
            "minkowski" => {
                if p == 1.0 {
                    Ok(Self::Manhattan)
                } else if p == 2.0 {
                    Ok(Self::Euclidean)
                } else {
                    Ok(Self::Minkowski(p))
                }
            }
            other => Err(BakeoffError::invalid_parameter(
                "metric",
                other,
                "expected 'euclidean', 'manhattan' or 'minkowski'",
            )),
        }
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(ai, bi)| {
                    let d = ai - bi;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
            DistanceMetric::Minkowski(p) => a
                .iter()
                .zip(b.iter())
                .map(|(ai, bi)| (ai - bi).abs().powf(p))
                .sum::<f64>()
                .powf(1.0 / p),
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

impl FromStr for WeightScheme {
    type Err = BakeoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "distance" => Ok(Self::Distance),
            other => Err(BakeoffError::invalid_parameter(
                "weights",
                other,
                "expected 'uniform' or 'distance'",
            )),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub config: KNNConfig,
    x_train: Option<Array2<f64>>,
    /// Training labels as positions in `classes`
    y_train: Vec<usize>,
    classes: Vec<f64>,
}

impl Default for KNNClassifier {
    fn default() -> Self {
        Self::new(KNNConfig::default())
    }
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(BakeoffError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.config.n_neighbors == 0 {
            return Err(BakeoffError::invalid_parameter(
                "n_neighbors",
                0,
                "must be at least 1",
            ));
        }
        if x.nrows() < self.config.n_neighbors {
            return Err(BakeoffError::invalid_parameter(
                "n_neighbors",
                self.config.n_neighbors,
                format!("exceeds the {} training samples", x.nrows()),
            ));
        }
        if let DistanceMetric::Minkowski(p) = self.config.metric {
            if !(p >= 1.0) {
                return Err(BakeoffError::invalid_parameter("p", p, "must be at least 1"));
            }
        }

        self.classes = unique_classes(y);
        self.y_train = super::decision_tree::encode_labels(y, &self.classes);
        self.x_train = Some(x.clone());

        Ok(self)
    }

    /// Predict class probabilities (parallelized over test samples)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(BakeoffError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let n_classes = self.classes.len();

        let probs: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = self.find_k_nearest(x.row(i), x_train);
                self.class_probs_from(&neighbors, n_classes)
            })
            .collect();

        let flat: Vec<f64> = probs.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let predictions: Vec<f64> = proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Max-heap over (distance, index); keeps the k smallest, earlier rows win ties
    fn find_k_nearest(&self, point: ArrayView1<f64>, x_train: &Array2<f64>) -> Vec<(f64, usize)> {
        let k = self.config.n_neighbors;
        let mut heap = BinaryHeap::with_capacity(k + 1);

        for (i, row) in x_train.rows().into_iter().enumerate() {
            let candidate = Neighbor(self.config.metric.distance(point, row), i);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(top) = heap.peek() {
                if candidate < *top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_iter().map(|n| (n.0, self.y_train[n.1])).collect()
    }

    fn class_probs_from(&self, neighbors: &[(f64, usize)], n_classes: usize) -> Vec<f64> {
        let mut counts = vec![0.0; n_classes];

        match self.config.weights {
            WeightScheme::Uniform => {
                for &(_, class) in neighbors {
                    counts[class] += 1.0;
                }
            }
            WeightScheme::Distance => {
                // Exact matches take all the weight
                let exact: Vec<usize> = neighbors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, c)| c)
                    .collect();
                if exact.is_empty() {
                    for &(dist, class) in neighbors {
                        counts[class] += 1.0 / dist;
                    }
                } else {
                    for class in exact {
                        counts[class] += 1.0;
                    }
                }
            }
        }

        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            counts.iter_mut().for_each(|c| *c /= total);
        }
        counts
    }
}

#[derive(PartialEq)]
struct Neighbor(f64, usize);

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}
