//! Linear model implementations

use super::decision_tree::{argmax, encode_labels, unique_classes};
use crate::error::{BakeoffError, Result};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Regularization penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    L2,
    None,
}

impl FromStr for Penalty {
    type Err = BakeoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "l2" => Ok(Penalty::L2),
            "none" => Ok(Penalty::None),
            other => Err(BakeoffError::invalid_parameter(
                "penalty",
                other,
                "expected 'l2' or 'none'",
            )),
        }
    }
}

/// Solve `a * x = b` for a symmetric positive definite `a` by Cholesky
/// decomposition; `None` when `a` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if !(diag > 0.0) {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Armijo sufficient-decrease constant for the line search
const ARMIJO: f64 = 1e-4;
/// Step halvings tried before the line search gives up
const MAX_HALVINGS: usize = 50;

/// Multinomial logistic regression trained by Newton's method
///
/// Minimizes the mean cross-entropy plus `||W||^2 / (2 * C * n_samples)`, the
/// usual `C`-weighted objective rescaled by `1 / (C * n_samples)`. The intercept
/// is not penalized. Each Newton step is damped by a backtracking line search,
/// so the objective decreases monotonically for any `C`. Fitting stops once the
/// largest gradient component falls below `tol`; `max_iter` only caps the
/// number of Newton steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients, shape (n_features, n_classes)
    pub coefficients: Option<Array2<f64>>,
    /// Fitted intercepts, one per class
    pub intercept: Option<Array1<f64>>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Inverse regularization strength
    pub c: f64,
    /// Penalty type
    pub penalty: Penalty,
    /// Maximum Newton iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest gradient component
    pub tol: f64,
    /// Sorted class labels seen during fit
    classes: Vec<f64>,
    /// Iterations run by the last fit
    n_iter: usize,
    /// Whether the last fit reached `tol`
    converged: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

/// Design matrix, one-hot targets and penalty of one fit
struct Objective<'a> {
    /// Features with a trailing column of ones when the intercept is fitted
    design: &'a Array2<f64>,
    targets: &'a Array2<f64>,
    /// Rows of the parameter matrix below this index are penalized
    n_penalized: usize,
    reg: f64,
}

impl Objective<'_> {
    fn n(&self) -> f64 {
        self.design.nrows() as f64
    }

    /// Mean cross-entropy plus penalty, and the softmax probabilities
    fn loss(&self, theta: &Array2<f64>) -> (f64, Array2<f64>) {
        let mut proba = self.design.dot(theta);
        let mut total = 0.0;
        for (mut row, target) in proba.rows_mut().into_iter().zip(self.targets.rows()) {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let log_norm = max + row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
            total += log_norm - row.dot(&target);
            row.mapv_inplace(|v| (v - log_norm).exp());
        }

        let penalty: f64 = theta
            .rows()
            .into_iter()
            .take(self.n_penalized)
            .map(|r| r.dot(&r))
            .sum();
        (total / self.n() + 0.5 * self.reg * penalty, proba)
    }

    /// Gradient with the same shape as `theta`
    fn gradient(&self, theta: &Array2<f64>, proba: &Array2<f64>) -> Array2<f64> {
        let mut grad = self.design.t().dot(&(proba - self.targets)) / self.n();
        for j in 0..self.n_penalized {
            let mut row = grad.row_mut(j);
            row.scaled_add(self.reg, &theta.row(j));
        }
        grad
    }

    /// Hessian over the parameters flattened class by class
    fn hessian(&self, proba: &Array2<f64>) -> Array2<f64> {
        let (n_rows, n_classes) = proba.dim();
        let width = self.design.ncols();
        let dim = width * n_classes;
        let mut hessian = Array2::<f64>::zeros((dim, dim));

        for k in 0..n_classes {
            for l in k..n_classes {
                // Per-sample weight p_k * (delta_kl - p_l)
                let weights = Array1::from_shape_fn(n_rows, |i| {
                    let delta = if k == l { 1.0 } else { 0.0 };
                    proba[[i, k]] * (delta - proba[[i, l]])
                });
                let weighted = self.design * &weights.insert_axis(Axis(1));
                let block = self.design.t().dot(&weighted) / self.n();
                for a in 0..width {
                    for b in 0..width {
                        hessian[[k * width + a, l * width + b]] = block[[a, b]];
                        hessian[[l * width + b, k * width + a]] = block[[a, b]];
                    }
                }
            }
        }

        for k in 0..n_classes {
            for j in 0..self.n_penalized {
                hessian[[k * width + j, k * width + j]] += self.reg;
            }
        }

        // The softmax is unchanged by shifting every class equally, which
        // leaves the Hessian singular along that direction
        let max_diag = hessian.diag().fold(0.0f64, |a, &b| a.max(b));
        let ridge = 1e-10 * max_diag.max(1.0);
        for i in 0..dim {
            hessian[[i, i]] += ridge;
        }
        hessian
    }
}

/// Flatten a (width, n_classes) matrix class by class
fn flatten(theta: &Array2<f64>) -> Array1<f64> {
    theta.t().iter().copied().collect()
}

fn unflatten(flat: &Array1<f64>, width: usize, n_classes: usize) -> Array2<f64> {
    Array2::from_shape_fn((width, n_classes), |(j, k)| flat[k * width + j])
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            c: 1.0,
            penalty: Penalty::L2,
            max_iter: 100,
            tol: 1e-4,
            classes: Vec::new(),
            n_iter: 0,
            converged: false,
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set penalty
    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Whether to fit the intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Row-wise softmax, shifted by the row max for stability
    fn softmax(z: &mut Array2<f64>) {
        for mut row in z.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
    }

    fn validate_params(&self) -> Result<()> {
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(BakeoffError::invalid_parameter("C", self.c, "must be positive"));
        }
        if self.max_iter == 0 {
            return Err(BakeoffError::invalid_parameter("max_iter", 0, "must be at least 1"));
        }
        if !(self.tol > 0.0) {
            return Err(BakeoffError::invalid_parameter("tol", self.tol, "must be positive"));
        }
        Ok(())
    }

    /// Fit the model with damped Newton steps
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(BakeoffError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.validate_params()?;

        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(BakeoffError::TrainingError(format!(
                "Logistic regression needs at least 2 classes, got {}",
                classes.len()
            )));
        }
        let n_classes = classes.len();

        // One-hot targets
        let mut targets = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &k) in encode_labels(y, &classes).iter().enumerate() {
            targets[[i, k]] = 1.0;
        }

        let width = n_features + usize::from(self.fit_intercept);
        let design = Array2::from_shape_fn((n_samples, width), |(i, j)| {
            if j < n_features {
                x[[i, j]]
            } else {
                1.0
            }
        });

        let objective = Objective {
            design: &design,
            targets: &targets,
            n_penalized: n_features,
            reg: match self.penalty {
                Penalty::L2 => 1.0 / (self.c * n_samples as f64),
                Penalty::None => 0.0,
            },
        };

        let mut theta = Array2::<f64>::zeros((width, n_classes));
        let (mut loss, mut proba) = objective.loss(&theta);
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < self.max_iter {
            let grad = objective.gradient(&theta, &proba);
            if grad.iter().fold(0.0f64, |a, &g| a.max(g.abs())) <= self.tol {
                converged = true;
                break;
            }
            n_iter += 1;

            let flat_grad = flatten(&grad);
            let mut direction = cholesky_solve(&objective.hessian(&proba), &flat_grad)
                .filter(|d| d.iter().all(|v| v.is_finite()))
                .unwrap_or_else(|| flat_grad.clone());
            let mut decrease = flat_grad.dot(&direction);
            if !(decrease > 0.0) {
                direction = flat_grad.clone();
                decrease = flat_grad.dot(&flat_grad);
            }
            let step = unflatten(&direction, width, n_classes);

            let mut t = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let candidate = &theta - &(&step * t);
                let (candidate_loss, candidate_proba) = objective.loss(&candidate);
                if candidate_loss <= loss - ARMIJO * t * decrease {
                    accepted = Some((candidate, candidate_loss, candidate_proba));
                    break;
                }
                t *= 0.5;
            }

            // No step decreases the objective: at the optimum to machine precision
            let Some((next, next_loss, next_proba)) = accepted else {
                converged = true;
                break;
            };
            theta = next;
            loss = next_loss;
            proba = next_proba;
        }

        if theta.iter().any(|w| !w.is_finite()) {
            return Err(BakeoffError::TrainingError(
                "Logistic regression produced non-finite coefficients".to_string(),
            ));
        }
        if !converged {
            debug!(
                n_iter,
                max_iter = self.max_iter,
                "Logistic regression stopped before reaching tol"
            );
        }

        let coefficients = theta.slice(s![..n_features, ..]).to_owned();
        let intercept = if self.fit_intercept {
            theta.row(n_features).to_owned()
        } else {
            Array1::zeros(n_classes)
        };

        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        self.classes = classes;
        self.n_iter = n_iter;
        self.converged = converged;

        Ok(self)
    }

    /// Predict class probabilities, one column per entry of `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (coefficients, intercept) = match (&self.coefficients, &self.intercept) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(BakeoffError::ModelNotFitted),
        };
        if x.ncols() != coefficients.nrows() {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} features", coefficients.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut proba = x.dot(coefficients) + intercept;
        Self::softmax(&mut proba);
        Ok(proba)
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

    /// Get accuracy score
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        super::models::accuracy_score(y, &y_pred)
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Newton iterations run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Whether the last fit met `tol` within `max_iter`
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression_binary() {
        let x = array![[-2.0, -2.0], [-1.5, -1.5], [-1.0, -1.0], [1.0, 1.0], [1.5, 1.5], [2.0, 2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());

        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy should be >= 0.8, got {}", accuracy);
    }

    #[test]
    fn test_logistic_regression_multiclass() {
        let x = array![
            [-2.0, 0.0],
            [-2.2, 0.3],
            [-1.8, -0.2],
            [2.0, 0.0],
            [2.1, 0.2],
            [1.9, -0.3],
            [0.0, 2.0],
            [0.2, 2.2],
            [-0.1, 1.8]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];

        let mut model = LogisticRegression::new().with_c(10.0);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_predict_proba() {
        let x = array![[0.0, 0.0], [10.0, 10.0]];
        let y = array![0.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (2, 2));
        assert!(proba[[0, 1]] < 0.5);
        assert!(proba[[1, 1]] > 0.5);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut weak = LogisticRegression::new().with_c(100.0).with_max_iter(300);
        let mut strong = LogisticRegression::new().with_c(0.01).with_max_iter(300);
        weak.fit(&x, &y).unwrap();
        strong.fit(&x, &y).unwrap();

        let norm = |m: &LogisticRegression| {
            m.coefficients
                .as_ref()
                .map(|w| w.mapv(|v| v * v).sum())
                .unwrap_or(0.0)
        };
        assert!(norm(&strong) < norm(&weak));
        assert!(weak.converged() && strong.converged());
    }

    #[test]
    fn test_heavy_regularization_on_tiny_data() {
        // C * n_samples = 0.04, far below where a fixed step would overshoot
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_c(0.01);
        model.fit(&x, &y).unwrap();
        assert!(model.converged());
        assert!(model.n_iter() < 100);

        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef.iter().all(|w| w.abs() < 1.0));
        assert!(coef[[0, 1]] > coef[[0, 0]]);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[[0, 0]] > 0.5);
        assert!(proba[[3, 1]] > 0.5);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_converges_to_stationary_point() {
        let x = array![
            [-2.0, 0.5],
            [-1.0, -0.3],
            [-0.2, 0.1],
            [0.3, -0.4],
            [1.1, 0.2],
            [2.0, -0.1]
        ];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

        for c in [0.001, 1.0, 1000.0] {
            let mut model = LogisticRegression::new().with_c(c).with_tol(1e-8);
            model.fit(&x, &y).unwrap();
            assert!(model.converged(), "C={} did not converge", c);

            // Gradient of the mean loss plus ||W||^2 / (2 C n) vanishes
            let w = model.coefficients.as_ref().unwrap();
            let proba = model.predict_proba(&x).unwrap();
            let mut residual = proba.clone();
            for (i, &label) in y.iter().enumerate() {
                residual[[i, label as usize]] -= 1.0;
            }
            let grad_w = x.t().dot(&residual) / 6.0 + w / (c * 6.0);
            let grad_b = residual.sum_axis(Axis(0)) / 6.0;
            assert!(grad_w.iter().chain(grad_b.iter()).all(|g| g.abs() < 1e-6));
        }
    }

    #[test]
    fn test_unpenalized_separable_data_stays_finite() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = LogisticRegression::new()
            .with_penalty(Penalty::None)
            .with_max_iter(30);
        model.fit(&x, &y).unwrap();
        assert!(model.n_iter() <= 30);
        assert!(model.coefficients.as_ref().unwrap().iter().all(|w| w.is_finite()));
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 1.0];
        let mut model = LogisticRegression::new();
        assert!(matches!(model.fit(&x, &y), Err(BakeoffError::TrainingError(_))));
    }

    #[test]
    fn test_invalid_c() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];
        let mut model = LogisticRegression::new().with_c(0.0);
        assert!(matches!(
            model.fit(&x, &y),
            Err(BakeoffError::InvalidParameter { .. })
        ));

        let mut model = LogisticRegression::new().with_tol(0.0);
        assert!(matches!(
            model.fit(&x, &y),
            Err(BakeoffError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_penalty_from_str() {
        assert_eq!("L2".parse::<Penalty>().unwrap(), Penalty::L2);
        assert_eq!("none".parse::<Penalty>().unwrap(), Penalty::None);
        assert!("l1".parse::<Penalty>().is_err());
    }
}
