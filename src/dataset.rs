//! Labeled dataset with a hold-out split
//!
//! The bundled iris data is embedded at compile time so a bake-off runs with no
//! files on disk. Any other CSV goes through [`DataLoader`].

use crate::error::{BakeoffError, Result};
use crate::training::class_key;
use crate::utils::{frame_to_arrays, DataLoader, LabeledArrays};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const IRIS_CSV: &str = include_str!("../data/iris.csv");
const IRIS_TARGET: &str = "species";

/// Rows of a dataset split into train and test parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Feature matrix, labels and an optional train/test split
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<f64>,
    feature_names: Vec<String>,
    target_names: Vec<String>,
    split: Option<TrainTestSplit>,
}

impl Dataset {
    /// Fisher's iris data: 150 samples, 4 features, 3 classes
    pub fn load_iris() -> Result<Self> {
        let df = DataLoader::new().load_csv_str(IRIS_CSV)?;
        let dataset = Self::from_labeled(frame_to_arrays(&df, IRIS_TARGET)?)?;
        debug!(
            n_samples = dataset.n_samples(),
            n_features = dataset.n_features(),
            "Loaded bundled iris dataset"
        );
        Ok(dataset)
    }

    /// Load a CSV file; every column except `target_column` is a feature
    pub fn load_csv(path: impl AsRef<Path>, target_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let df = DataLoader::new().load_csv(path)?;
        let dataset = Self::from_labeled(frame_to_arrays(&df, target_column)?)?;
        info!(
            path = %path.display(),
            n_samples = dataset.n_samples(),
            n_features = dataset.n_features(),
            n_classes = dataset.n_classes(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    pub fn from_arrays(
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
        target_names: Vec<String>,
    ) -> Result<Self> {
        Self::from_labeled(LabeledArrays {
            x,
            y,
            feature_names,
            target_names,
        })
    }

    fn from_labeled(arrays: LabeledArrays) -> Result<Self> {
        let LabeledArrays {
            x,
            y,
            feature_names,
            target_names,
        } = arrays;

        if x.nrows() == 0 {
            return Err(BakeoffError::DataError("Dataset is empty".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        for &label in y.iter() {
            class_key(label)?;
        }
        if feature_names.len() != x.ncols() {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        Ok(Self {
            x,
            y,
            feature_names,
            target_names,
            split: None,
        })
    }

    /// Shuffle and split into train and test sets
    ///
    /// The test set holds `ceil(n_samples * test_size)` rows. With `stratify`
    /// each class is split in proportion to its share of the data.
    pub fn preprocess(
        &mut self,
        test_size: f64,
        random_state: u64,
        stratify: bool,
    ) -> Result<&TrainTestSplit> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(BakeoffError::invalid_parameter(
                "test_size",
                test_size,
                "must be in (0, 1)",
            ));
        }

        let n = self.n_samples();
        let n_test = (n as f64 * test_size).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(BakeoffError::DataError(format!(
                "test_size={} leaves an empty split for {} samples",
                test_size, n
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(random_state);
        let (mut train_indices, mut test_indices) = if stratify {
            self.stratified_indices(n_test, &mut rng)?
        } else {
            let mut permutation: Vec<usize> = (0..n).collect();
            permutation.shuffle(&mut rng);
            let train = permutation.split_off(n_test);
            (train, permutation)
        };
        if stratify {
            train_indices.shuffle(&mut rng);
            test_indices.shuffle(&mut rng);
        }

        let split = TrainTestSplit {
            x_train: self.x.select(Axis(0), &train_indices),
            x_test: self.x.select(Axis(0), &test_indices),
            y_train: self.y.select(Axis(0), &train_indices),
            y_test: self.y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        };

        info!(
            n_train = split.train_indices.len(),
            n_test = split.test_indices.len(),
            stratify,
            "Split dataset"
        );

        Ok(&*self.split.insert(split))
    }

    /// Per-class allocation by largest remainder so totals add up to `n_test`
    fn stratified_indices(
        &self,
        n_test: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let n = self.n_samples();
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, &label) in self.y.iter().enumerate() {
            by_class.entry(class_key(label)?).or_default().push(i);
        }

        let mut quotas: Vec<(usize, f64)> = by_class
            .values()
            .map(|members| {
                let exact = members.len() as f64 * n_test as f64 / n as f64;
                (exact.floor() as usize, exact - exact.floor())
            })
            .collect();

        let assigned: usize = quotas.iter().map(|(q, _)| q).sum();
        let mut order: Vec<usize> = (0..quotas.len()).collect();
        order.sort_by(|&a, &b| {
            quotas[b]
                .1
                .partial_cmp(&quotas[a].1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for &class in order.iter().take(n_test.saturating_sub(assigned)) {
            quotas[class].0 += 1;
        }

        let mut train = Vec::with_capacity(n - n_test);
        let mut test = Vec::with_capacity(n_test);
        for (members, (quota, _)) in by_class.into_values().zip(quotas) {
            let mut members = members;
            members.shuffle(rng);
            let rest = members.split_off(quota.min(members.len()));
            test.extend(members);
            train.extend(rest);
        }
        Ok((train, test))
    }

    fn require_split(&self) -> Result<&TrainTestSplit> {
        self.split.as_ref().ok_or_else(|| {
            BakeoffError::DataError("Dataset has not been split; call preprocess() first".to_string())
        })
    }

    pub fn split(&self) -> Option<&TrainTestSplit> {
        self.split.as_ref()
    }

    pub fn x_train(&self) -> Result<&Array2<f64>> {
        Ok(&self.require_split()?.x_train)
    }

    pub fn x_test(&self) -> Result<&Array2<f64>> {
        Ok(&self.require_split()?.x_test)
    }

    pub fn y_train(&self) -> Result<&Array1<f64>> {
        Ok(&self.require_split()?.y_train)
    }

    pub fn y_test(&self) -> Result<&Array1<f64>> {
        Ok(&self.require_split()?.y_test)
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Number of distinct labels
    pub fn n_classes(&self) -> usize {
        let mut labels: Vec<i64> = self.y.iter().filter_map(|&v| class_key(v).ok()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_iris() {
        let ds = Dataset::load_iris().unwrap();
        assert_eq!(ds.n_samples(), 150);
        assert_eq!(ds.n_features(), 4);
        assert_eq!(ds.n_classes(), 3);
        assert_eq!(ds.target_names(), &["setosa", "versicolor", "virginica"]);
        assert_eq!(ds.feature_names()[0], "sepal length (cm)");
        assert_eq!(ds.x()[[0, 0]], 5.1);
        assert_eq!(ds.y()[149], 2.0);
    }

    #[test]
    fn test_preprocess_sizes() {
        let mut ds = Dataset::load_iris().unwrap();
        let split = ds.preprocess(0.2, 42, false).unwrap();
        assert_eq!(split.test_indices.len(), 30);
        assert_eq!(split.train_indices.len(), 120);
        assert_eq!(ds.x_train().unwrap().dim(), (120, 4));
        assert_eq!(ds.y_test().unwrap().len(), 30);
    }

    #[test]
    fn test_test_size_rounds_up() {
        let x = Array2::from_shape_fn((10, 1), |(r, _)| r as f64);
        let y = Array1::from_shape_fn(10, |i| (i % 2) as f64);
        let mut ds = Dataset::from_arrays(x, y, vec!["a".into()], vec![]).unwrap();
        let split = ds.preprocess(0.25, 0, false).unwrap();
        assert_eq!(split.test_indices.len(), 3);
    }

    #[test]
    fn test_split_is_partition_and_reproducible() {
        let mut a = Dataset::load_iris().unwrap();
        let mut b = Dataset::load_iris().unwrap();
        let sa = a.preprocess(0.2, 7, false).unwrap().clone();
        let sb = b.preprocess(0.2, 7, false).unwrap();
        assert_eq!(sa.test_indices, sb.test_indices);

        let mut all: Vec<usize> = sa.train_indices.iter().chain(&sa.test_indices).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_split_keeps_proportions() {
        let mut ds = Dataset::load_iris().unwrap();
        let split = ds.preprocess(0.2, 3, true).unwrap();
        for class in 0..3 {
            let n = split.y_test.iter().filter(|&&v| v == class as f64).count();
            assert_eq!(n, 10);
        }
    }

    #[test]
    fn test_invalid_test_size() {
        let mut ds = Dataset::load_iris().unwrap();
        assert!(ds.preprocess(0.0, 0, false).is_err());
        assert!(ds.preprocess(1.0, 0, false).is_err());
        assert!(ds.preprocess(f64::NAN, 0, false).is_err());
    }

    #[test]
    fn test_accessors_before_split() {
        let ds = Dataset::load_iris().unwrap();
        assert!(matches!(ds.x_train(), Err(BakeoffError::DataError(_))));
        assert!(ds.split().is_none());
    }

    #[test]
    fn test_from_arrays_rejects_fractional_labels() {
        let x = Array2::zeros((4, 1));
        let y = Array1::from_vec(vec![0.1, 0.2, 0.1, 0.2]);
        let result = Dataset::from_arrays(x, y, vec!["a".into()], vec![]);
        assert!(matches!(result, Err(BakeoffError::DataError(_))));
    }

    #[test]
    fn test_csv_with_fractional_labels_stratifies_by_class() {
        let mut csv = String::from("x,y\n");
        for i in 0..20 {
            csv.push_str(&format!("{},{}\n", i, if i % 2 == 0 { "0.1" } else { "0.2" }));
        }
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), csv).unwrap();

        let mut ds = Dataset::load_csv(file.path(), "y").unwrap();
        assert_eq!(ds.n_classes(), 2);
        assert_eq!(ds.target_names(), &["0.1", "0.2"]);

        let split = ds.preprocess(0.2, 5, true).unwrap();
        for class in 0..2 {
            let n = split.y_test.iter().filter(|&&v| v == class as f64).count();
            assert_eq!(n, 2);
        }
    }

    #[test]
    fn test_from_arrays_shape_mismatch() {
        let x = Array2::zeros((3, 2));
        let y = Array1::zeros(2);
        let result = Dataset::from_arrays(x, y, vec!["a".into(), "b".into()], vec![]);
        assert!(matches!(result, Err(BakeoffError::ShapeError { .. })));
    }
}
