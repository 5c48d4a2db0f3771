//! Sufficient statistics and the EM M-step
//!
//! For each component the accumulator keeps the occupation count
//! `Σ r`, the weighted sum `Σ r·x` and the weighted sum of squares
//! `Σ r·x²` (diagonal only). The same statistics feed both the maximum
//! likelihood reestimation here and the discriminative updates in
//! [`crate::mmie`].

use gaussmix_config::constants::em::{MIN_RESPONSIBILITY, NEGLIGIBLE_OCCUPATION};
use gaussmix_config::TrainingConfig;
use gaussmix_core::{Mixture, LOG_ZERO};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

use crate::{Result, TrainerError};

/// Which parameters an update may change, plus the numeric guards it applies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReestimationParams {
    pub covariance_floor: f64,
    /// Components with `ln w` below this get no responsibility
    pub min_log_weight: f64,
    pub update_weights: bool,
    pub update_means: bool,
    pub update_covariances: bool,
}

impl ReestimationParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            covariance_floor: config.covariance_floor,
            min_log_weight: config.log_weight_floor(),
            update_weights: config.update_weights,
            update_means: config.update_means,
            update_covariances: config.update_covariances,
        }
    }
}

impl Default for ReestimationParams {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// Zeroth, first and second order statistics of one component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentStats {
    pub occupation: f64,
    pub weighted_sum: Array1<f64>,
    pub weighted_sum_sq: Array1<f64>,
}

impl ComponentStats {
    pub fn zeros(dimension: usize) -> Self {
        Self {
            occupation: 0.0,
            weighted_sum: Array1::zeros(dimension),
            weighted_sum_sq: Array1::zeros(dimension),
        }
    }

    #[inline]
    pub fn add(&mut self, responsibility: f64, x: ArrayView1<'_, f64>) {
        self.occupation += responsibility;
        self.weighted_sum.scaled_add(responsibility, &x);
        Zip::from(&mut self.weighted_sum_sq)
            .and(&x)
            .for_each(|s, &v| *s += responsibility * v * v);
    }

    pub fn reset(&mut self) {
        self.occupation = 0.0;
        self.weighted_sum.fill(0.0);
        self.weighted_sum_sq.fill(0.0);
    }

    /// True when the component effectively saw no data
    pub fn is_negligible(&self) -> bool {
        self.occupation <= NEGLIGIBLE_OCCUPATION
    }
}

/// Result of one M-step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReestimationSummary {
    /// Components whose parameters were reestimated
    pub updated: usize,
    /// Components that received no responsibility and were zero-weighted
    pub zero_weighted: usize,
}

/// Statistics for every component of one mixture
#[derive(Debug, Clone)]
pub struct MixtureAccumulator {
    stats: Vec<ComponentStats>,
    log_likelihood: f64,
    num_examples: usize,
    min_log_weight: f64,
}

impl MixtureAccumulator {
    /// Empty accumulator shaped like `mixture`
    pub fn new(mixture: &Mixture, min_log_weight: f64) -> Self {
        let dimension = mixture.dimension();
        Self {
            stats: (0..mixture.len())
                .map(|_| ComponentStats::zeros(dimension))
                .collect(),
            log_likelihood: 0.0,
            num_examples: 0,
            min_log_weight,
        }
    }

    /// Zero all statistics
    pub fn reset(&mut self) {
        self.stats.iter_mut().for_each(ComponentStats::reset);
        self.log_likelihood = 0.0;
        self.num_examples = 0;
    }

    /// Add one example; returns its log-likelihood under `mixture`
    pub fn accumulate(&mut self, mixture: &Mixture, x: ArrayView1<'_, f64>) -> f64 {
        let (responsibilities, log_likelihood) =
            mixture.responsibilities_with_log_likelihood(x, self.min_log_weight);
        self.add_responsibilities(&responsibilities, x);
        self.log_likelihood += log_likelihood;
        self.num_examples += 1;
        log_likelihood
    }

    /// Add every row of `data`; returns their summed log-likelihood
    pub fn accumulate_rows(&mut self, mixture: &Mixture, data: ArrayView2<'_, f64>) -> f64 {
        data.rows()
            .into_iter()
            .map(|x| self.accumulate(mixture, x))
            .sum()
    }

    /// Add precomputed responsibilities for `x`
    pub fn add_responsibilities(&mut self, responsibilities: &[f64], x: ArrayView1<'_, f64>) {
        for (stats, &r) in self.stats.iter_mut().zip(responsibilities) {
            if r >= MIN_RESPONSIBILITY {
                stats.add(r, x);
            }
        }
    }

    pub fn stats(&self) -> &[ComponentStats] {
        &self.stats
    }

    /// Summed log-likelihood of everything accumulated since the last reset
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    pub fn total_occupation(&self) -> f64 {
        self.stats.iter().map(|s| s.occupation).sum()
    }

    /// Maximum-likelihood reestimation of `mixture` from the accumulated
    /// statistics.
    ///
    /// Weights become `n_m / Σ n`; means `Σ r·x / n_m`; variances
    /// `Σ r·x² / n_m - 2μ·Σ r·x / n_m + μ²` around whichever mean the
    /// component ends up with (so frozen means still get a consistent
    /// variance), floored at `covariance_floor`. A component with no
    /// occupation keeps its parameters and, if weights are updated, gets
    /// weight zero.
    pub fn reestimate(
        &self,
        mixture: &mut Mixture,
        params: &ReestimationParams,
        class: usize,
    ) -> Result<ReestimationSummary> {
        if self.stats.len() != mixture.len() {
            return Err(gaussmix_core::Error::InvalidModel(format!(
                "accumulator holds {} components, mixture has {}",
                self.stats.len(),
                mixture.len()
            ))
            .into());
        }

        let mut summary = ReestimationSummary::default();
        let total = self.total_occupation();
        if total <= NEGLIGIBLE_OCCUPATION {
            tracing::warn!(class, "No occupation accumulated; mixture left unchanged");
            return Ok(summary);
        }

        for (index, (component, stats)) in
            mixture.components.iter_mut().zip(&self.stats).enumerate()
        {
            if stats.is_negligible() {
                if params.update_weights && component.weight > 0.0 {
                    component.weight = 0.0;
                    summary.zero_weighted += 1;
                    tracing::debug!(class, component = index, "Component received no data, weight set to zero");
                }
                continue;
            }

            let count = stats.occupation;
            if params.update_weights {
                component.weight = count / total;
            }

            let gaussian = &mut component.gaussian;
            if params.update_means {
                gaussian.mean = &stats.weighted_sum / count;
            }
            if params.update_covariances {
                let mean = &gaussian.mean;
                let floor = params.covariance_floor;
                Zip::from(&mut gaussian.variance)
                    .and(mean)
                    .and(&stats.weighted_sum)
                    .and(&stats.weighted_sum_sq)
                    .for_each(|var, &mu, &sum, &sum_sq| {
                        let v = sum_sq / count - 2.0 * mu * sum / count + mu * mu;
                        *var = v.max(floor);
                    });
            }

            if !component.weight.is_finite() || !gaussian.is_finite() {
                return Err(TrainerError::NumericalFailure {
                    class,
                    component: index,
                    detail: format!("non-finite parameters after reestimation (occupation {})", count),
                });
            }
            summary.updated += 1;
        }

        Ok(summary)
    }
}

/// Skip threshold for accumulators that must see every nonzero component
pub const NO_SKIP: f64 = LOG_ZERO;
