//! Shared classifier trait and evaluation metrics

use super::decision_tree::{unique_classes, DecisionTree};
use super::knn::KNNClassifier;
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use crate::error::{BakeoffError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Integer key of a class label
///
/// Labels are class indices stored as `f64`; anything that is not a finite
/// whole number is rejected rather than merged with a neighbouring class.
pub fn class_key(label: f64) -> Result<i64> {
    if label.is_finite() && label.fract() == 0.0 {
        Ok(label as i64)
    } else {
        Err(BakeoffError::DataError(format!(
            "Class label {} is not a whole number",
            label
        )))
    }
}

/// Fraction of predictions equal to the true label
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(BakeoffError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(BakeoffError::ValidationError(
            "Cannot score an empty set of predictions".to_string(),
        ));
    }

    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Classification metrics for a set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Unweighted mean over labels
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
    /// Sorted union of true and predicted labels
    pub labels: Vec<f64>,
    /// Rows are true labels, columns predicted labels
    pub confusion_matrix: Vec<Vec<usize>>,
    pub n_samples: usize,
}

impl ClassificationMetrics {
    /// Compute metrics from true and predicted labels
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        let accuracy = accuracy_score(y_true, y_pred)?;

        let all: Array1<f64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let labels = unique_classes(&all);
        let k = labels.len();
        let index = |v: f64| labels.iter().position(|&l| l == v).unwrap_or_default();

        let mut confusion = vec![vec![0usize; k]; k];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            confusion[index(t)][index(p)] += 1;
        }

        let mut precision_sum = 0.0;
        let mut recall_sum = 0.0;
        let mut f1_sum = 0.0;
        for c in 0..k {
            let tp = confusion[c][c] as f64;
            let predicted: usize = (0..k).map(|r| confusion[r][c]).sum();
            let actual: usize = confusion[c].iter().sum();

            let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
            let recall = if actual > 0 { tp / actual as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            precision_sum += precision;
            recall_sum += recall;
            f1_sum += f1;
        }

        let k_f = k as f64;
        Ok(Self {
            accuracy,
            precision_macro: precision_sum / k_f,
            recall_macro: recall_sum / k_f,
            f1_macro: f1_sum / k_f,
            labels,
            confusion_matrix: confusion,
            n_samples: y_true.len(),
        })
    }
}

/// Common interface over the classifiers in this crate
pub trait Model: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities, one column per fitted class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Accuracy on the given data
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        accuracy_score(y, &y_pred)
    }

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LogisticRegression::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        LogisticRegression::predict_proba(self, x)
    }
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        DecisionTree::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        DecisionTree::feature_importances(self).cloned()
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        RandomForest::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        RandomForest::feature_importances(self).cloned()
    }
}

impl Model for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        KNNClassifier::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        KNNClassifier::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        KNNClassifier::predict_proba(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_score() {
        let y_true = array![1.0, 0.0, 2.0, 1.0];
        let y_pred = array![1.0, 0.0, 1.0, 1.0];
        assert_eq!(accuracy_score(&y_true, &y_pred).unwrap(), 0.75);
    }

    #[test]
    fn test_accuracy_length_mismatch() {
        let result = accuracy_score(&array![1.0, 0.0], &array![1.0]);
        assert!(matches!(result, Err(BakeoffError::ShapeError { .. })));
    }

    #[test]
    fn test_classification_metrics() {
        let y_true = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0, 2.0, 0.0];

        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();

        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(m.labels, vec![0.0, 1.0, 2.0]);
        assert_eq!(m.confusion_matrix, vec![vec![1, 1, 0], vec![0, 2, 0], vec![1, 0, 1]]);

        // precision: 1/2, 2/3, 1/1 ; recall: 1/2, 1, 1/2
        let precision = (0.5 + 2.0 / 3.0 + 1.0) / 3.0;
        let recall = (0.5 + 1.0 + 0.5) / 3.0;
        assert!((m.precision_macro - precision).abs() < 1e-12);
        assert!((m.recall_macro - recall).abs() < 1e-12);
        assert!(m.f1_macro > 0.0 && m.f1_macro < 1.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let y = array![0.0, 1.0, 2.0];
        let m = ClassificationMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1_macro, 1.0);
    }

    #[test]
    fn test_trait_object_dispatch() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut models: Vec<Box<dyn Model>> = vec![
            Box::new(DecisionTree::new()),
            Box::new(KNNClassifier::with_k(1)),
        ];
        for model in models.iter_mut() {
            model.fit(&x, &y).unwrap();
            assert_eq!(model.score(&x, &y).unwrap(), 1.0);
        }
    }
}
