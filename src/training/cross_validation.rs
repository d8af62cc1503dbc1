//! Cross-validation implementations

use super::models::class_key;
use crate::error::{BakeoffError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold {
            n_splits: 10,
            shuffle: true,
        }
    }
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => {
                *n_splits
            }
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    pub fn n_splits(&self) -> usize {
        self.strategy.n_splits()
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(BakeoffError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(BakeoffError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        match &self.strategy {
            CVStrategy::KFold { shuffle, .. } => self.k_fold_split(n_samples, n_splits, *shuffle),
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                let y = y.ok_or_else(|| {
                    BakeoffError::ValidationError(
                        "StratifiedKFold requires target array".to_string(),
                    )
                })?;
                if y.len() != n_samples {
                    return Err(BakeoffError::ShapeError {
                        expected: format!("y length = {}", n_samples),
                        actual: format!("y length = {}", y.len()),
                    });
                }
                self.stratified_k_fold_split(y, n_splits, *shuffle)
            }
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        let mut indices: Vec<usize> = (0..n_samples).collect();

        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut folds = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            folds.push(indices[current..current + fold_size].to_vec());
            current += fold_size;
        }

        Ok(Self::splits_from_folds(folds))
    }

    fn stratified_k_fold_split(
        &self,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        // Group samples by class, classes in sorted order
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(class_key(val)?).or_default().push(idx);
        }

        let largest = class_indices.values().map(Vec::len).max().unwrap_or(0);
        if n_splits > largest {
            return Err(BakeoffError::ValidationError(format!(
                "n_splits ({}) cannot be greater than the number of members in each class ({})",
                n_splits, largest
            )));
        }
        let smallest = class_indices.values().map(Vec::len).min().unwrap_or(0);
        if smallest < n_splits {
            warn!(
                smallest_class = smallest,
                n_splits, "The least populated class has fewer members than n_splits"
            );
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Round-robin per class, continuing where the previous class stopped
        // so fold sizes differ by at most one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for indices in class_indices.values() {
            for (i, &idx) in indices.iter().enumerate() {
                folds[(offset + i) % n_splits].push(idx);
            }
            offset = (offset + indices.len()) % n_splits;
        }

        Ok(Self::splits_from_folds(folds))
    }

    fn splits_from_folds(mut folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
        for fold in &mut folds {
            fold.sort_unstable();
        }

        (0..folds.len())
            .map(|fold_idx| {
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();

                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores. A NaN fold score makes the mean NaN.
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: f64::NAN,
                std_score: f64::NAN,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_uneven() {
        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 3,
            shuffle: true,
        })
        .with_random_state(0);
        let splits = cv.split(10, None).unwrap();

        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: false,
        });
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_stratified_covers_every_sample_once() {
        let y: Array1<f64> = (0..30).map(|i| (i % 3) as f64).collect();

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: 4,
            shuffle: true,
        })
        .with_random_state(42);
        let splits = cv.split(30, Some(&y)).unwrap();

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..30).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 30);
            assert!(split.test_indices.len() == 7 || split.test_indices.len() == 8);
        }
    }

    #[test]
    fn test_stratified_seeded_is_reproducible() {
        let y: Array1<f64> = (0..20).map(|i| (i % 2) as f64).collect();
        let strategy = CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: true,
        };

        let a = CrossValidator::new(strategy.clone()).with_random_state(9).split(20, Some(&y)).unwrap();
        let b = CrossValidator::new(strategy).with_random_state(9).split(20, Some(&y)).unwrap();

        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_stratified_requires_targets() {
        let cv = CrossValidator::new(CVStrategy::default());
        assert!(cv.split(20, None).is_err());
    }

    #[test]
    fn test_too_many_splits() {
        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        });
        assert!(cv.split(3, None).is_err());

        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 1,
            shuffle: false,
        });
        assert!(cv.split(10, None).is_err());
    }

    #[test]
    fn test_stratified_class_too_small() {
        let y = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: 3,
            shuffle: false,
        });
        assert!(cv.split(6, Some(&y)).is_err());
    }

    #[test]
    fn test_stratified_rejects_fractional_labels() {
        // 0.1 and 0.2 must not collapse into one stratum
        let y: Array1<f64> = (0..20).map(|i| if i < 10 { 0.1 } else { 0.2 }).collect();
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: true,
        })
        .with_random_state(3);
        assert!(matches!(cv.split(20, Some(&y)), Err(BakeoffError::DataError(_))));
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.8, 1.0]);
        assert!((results.mean_score - 0.9).abs() < 1e-12);
        assert!((results.std_score - 0.1).abs() < 1e-12);
        assert_eq!(results.n_folds, 2);

        let with_nan = CVResults::from_scores(vec![0.8, f64::NAN]);
        assert!(with_nan.mean_score.is_nan());
    }
}
