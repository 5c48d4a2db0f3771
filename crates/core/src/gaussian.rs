//! Diagonal-covariance Gaussian density
//!
//! Parameters are a mean vector and a variance vector of the same length.
//! Every variance component is kept at or above a covariance floor so the
//! log-density is always finite.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// `ln(2π)`
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// One diagonal Gaussian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    /// Mean vector
    pub mean: Array1<f64>,
    /// Per-dimension variance
    pub variance: Array1<f64>,
}

impl Gaussian {
    /// Create a Gaussian, checking that mean and variance agree in length
    pub fn new(mean: Array1<f64>, variance: Array1<f64>) -> Result<Self> {
        if mean.len() != variance.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                found: variance.len(),
            });
        }
        if variance.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(Error::InvalidModel(
                "variance components must be finite and positive".to_string(),
            ));
        }
        Ok(Self { mean, variance })
    }

    /// Zero-mean Gaussian with the given variance in every dimension
    pub fn isotropic(dimension: usize, variance: f64) -> Self {
        Self {
            mean: Array1::zeros(dimension),
            variance: Array1::from_elem(dimension, variance),
        }
    }

    /// Fit mean and (population) variance to the rows of `samples`.
    ///
    /// Returns `None` when there are no rows.
    pub fn from_samples(samples: ArrayView2<'_, f64>, covariance_floor: f64) -> Option<Self> {
        if samples.nrows() == 0 {
            return None;
        }
        let mean = samples.mean_axis(Axis(0))?;
        let mut variance = samples.var_axis(Axis(0), 0.0);
        variance.mapv_inplace(|v| v.max(covariance_floor));
        Some(Self { mean, variance })
    }

    /// Feature dimension
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Log of the density at `x`, summed per dimension in the log domain.
    ///
    /// `x` must have the Gaussian's dimension; extra or missing components are
    /// not checked here (callers validate once per dataset, not per example).
    pub fn log_density(&self, x: ArrayView1<'_, f64>) -> f64 {
        let mut acc = 0.0;
        for ((&xi, &mu), &var) in x.iter().zip(self.mean.iter()).zip(self.variance.iter()) {
            let diff = xi - mu;
            acc += LN_2PI + var.ln() + diff * diff / var;
        }
        -0.5 * acc
    }

    /// Raise every variance component to at least `floor`
    pub fn apply_variance_floor(&mut self, floor: f64) {
        self.variance.mapv_inplace(|v| v.max(floor));
    }

    /// Standard deviation per dimension
    pub fn std_dev(&self) -> Array1<f64> {
        self.variance.mapv(f64::sqrt)
    }

    /// True when every parameter is a finite number
    pub fn is_finite(&self) -> bool {
        self.mean.iter().chain(self.variance.iter()).all(|v| v.is_finite())
    }
}
