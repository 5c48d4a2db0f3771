//! Expectation-maximization for one class mixture
//!
//! Each iteration zeroes the accumulator, accumulates every example of
//! the class, reestimates, and stops once the per-pattern log-likelihood
//! changes by less than the threshold or the iteration cap is hit.

use gaussmix_config::TrainingConfig;
use gaussmix_core::Mixture;
use ndarray::ArrayView2;

use crate::accumulator::{MixtureAccumulator, ReestimationParams};
use crate::{Result, TrainerError};

/// EM loop settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmOptions {
    pub max_iterations: usize,
    /// Stop when `|ΔLL| / n` falls below this
    pub convergence_threshold: f64,
    pub reestimation: ReestimationParams,
}

impl EmOptions {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            convergence_threshold: config.convergence_threshold,
            reestimation: ReestimationParams::from_config(config),
        }
    }
}

impl Default for EmOptions {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// Summary of one EM fit
#[derive(Debug, Clone, PartialEq)]
pub struct EmOutcome {
    pub iterations: usize,
    pub converged: bool,
    /// Total log-likelihood of the final parameters
    pub log_likelihood: f64,
    /// Per-pattern log-likelihood measured at the start of each iteration
    pub history: Vec<f64>,
}

impl EmOutcome {
    /// Final log-likelihood divided by `num_examples`
    pub fn per_pattern(&self, num_examples: usize) -> f64 {
        if num_examples == 0 {
            0.0
        } else {
            self.log_likelihood / num_examples as f64
        }
    }
}

/// Summed log-likelihood of `data` under `mixture`
pub fn total_log_likelihood(mixture: &Mixture, data: ArrayView2<'_, f64>) -> f64 {
    data.rows().into_iter().map(|x| mixture.log_likelihood(x)).sum()
}

/// Run EM on `mixture` in place over the rows of `data`
pub fn fit_class(
    mixture: &mut Mixture,
    data: ArrayView2<'_, f64>,
    options: &EmOptions,
    class: usize,
) -> Result<EmOutcome> {
    let n = data.nrows();
    if n == 0 {
        return Ok(EmOutcome {
            iterations: 0,
            converged: true,
            log_likelihood: 0.0,
            history: Vec::new(),
        });
    }

    let mut accumulator = MixtureAccumulator::new(mixture, options.reestimation.min_log_weight);
    let mut history = Vec::with_capacity(options.max_iterations);
    let mut previous: Option<f64> = None;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;
        accumulator.reset();
        let log_likelihood = accumulator.accumulate_rows(mixture, data);
        if !log_likelihood.is_finite() {
            return Err(TrainerError::NonFiniteLikelihood { class });
        }
        let per_pattern = log_likelihood / n as f64;
        history.push(per_pattern);

        accumulator.reestimate(mixture, &options.reestimation, class)?;

        if let Some(prev) = previous {
            if (per_pattern - prev).abs() < options.convergence_threshold {
                converged = true;
                break;
            }
        }
        previous = Some(per_pattern);
    }

    let log_likelihood = total_log_likelihood(mixture, data);
    if !log_likelihood.is_finite() {
        return Err(TrainerError::NonFiniteLikelihood { class });
    }

    tracing::trace!(
        class,
        iterations,
        converged,
        components = mixture.len(),
        log_likelihood_per_pattern = log_likelihood / n as f64,
        "EM finished"
    );

    Ok(EmOutcome {
        iterations,
        converged,
        log_likelihood,
        history,
    })
}
