//! Feature scaling

use crate::error::{BakeoffError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standardizes each column to zero mean and unit variance
///
/// Uses the population standard deviation (ddof = 0). Constant columns are
/// only centered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    /// Create an unfitted scaler
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    /// Per-column means seen during fit
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(BakeoffError::ValidationError(
                "Cannot fit scaler on empty data".to_string(),
            ));
        }

        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x.std_axis(Axis(0), 0.0);

        // Constant columns pass through unscaled
        let scale = std.mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });

        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x, mean.len())?;

        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            row -= mean;
            row /= scale;
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Inverse transform the data
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x, mean.len())?;

        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            row *= scale;
            row += mean;
        }
        Ok(out)
    }

    fn params(&self) -> Result<(&Array1<f64>, &Array1<f64>)> {
        match (&self.mean, &self.scale) {
            (Some(c), Some(s)) => Ok((c, s)),
            _ => Err(BakeoffError::ModelNotFitted),
        }
    }

    fn check_width(&self, x: &Array2<f64>, expected: usize) -> Result<()> {
        if x.ncols() != expected {
            return Err(BakeoffError::ShapeError {
                expected: format!("{} features", expected),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }
}
