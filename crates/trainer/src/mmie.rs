//! MMIE discriminative training
//!
//! Maximizes `F = Σ_i ln p(x_i | c_i) − Σ_i ln p_gen(x_i) + Σ_c n_c ln π_c`
//! with extended Baum-Welch updates. Numerator statistics come from each
//! class's own mixture, denominator statistics from the pooled
//! [`GeneratorModel`]. The objective can go down between iterations, so
//! the loop threads a [`BestSnapshot`] through every iteration and always
//! returns it, never the last iterate.

use gaussmix_config::constants::em::NEGLIGIBLE_OCCUPATION;
use gaussmix_config::constants::mmie::{D_DECREASE, D_INCREASE, MAX_D_DOUBLINGS};
use gaussmix_config::TrainingConfig;
use gaussmix_core::{Component, Gaussian, Mixture};
use ndarray::{Array1, Array2};

use crate::accumulator::{ComponentStats, MixtureAccumulator, ReestimationParams, NO_SKIP};
use crate::generator::GeneratorModel;
use crate::{Result, TrainerError};

/// MMIE loop settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmieOptions {
    pub max_iterations: usize,
    /// Per-pattern change counted as "no change"
    pub convergence_threshold: f64,
    /// Consecutive small changes that mean convergence
    pub convergence_window: usize,
    /// Iterations without a new best before giving up
    pub patience: usize,
    pub minimum_d: f64,
    pub auto_tune_d: bool,
    pub reestimation: ReestimationParams,
}

impl MmieOptions {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            max_iterations: config.resolved_mmie_max_iterations(),
            convergence_threshold: config.resolved_mmie_convergence_threshold(),
            convergence_window: config.resolved_mmie_convergence_window(),
            patience: config.resolved_mmie_patience(),
            minimum_d: config.resolved_mmie_minimum_d(),
            auto_tune_d: config.resolved_auto_tune_d(),
            reestimation: ReestimationParams::from_config(config),
        }
    }
}

impl Default for MmieOptions {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// Why the MMIE loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmieStatus {
    /// Objective stopped changing
    Converged,
    /// No new best objective within the patience window
    Stalled,
    /// Hit the iteration cap
    IterationLimit,
}

impl MmieStatus {
    /// True for the two aborting stop reasons
    pub fn is_aborted(&self) -> bool {
        !matches!(self, MmieStatus::Converged)
    }
}

/// What [`ProgressTracker::observe`] concluded about one objective value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Change from the previous iteration (`None` on the first)
    pub improvement: Option<f64>,
    /// The value beat every earlier one
    pub new_best: bool,
    pub stop: Option<MmieStatus>,
}

/// Stopping-rule bookkeeping, fed one per-pattern objective per iteration.
///
/// Convergence wins over patience when both trigger on the same step.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    threshold: f64,
    window: usize,
    patience: usize,
    previous: Option<f64>,
    best: f64,
    small_changes: usize,
    since_best: usize,
}

impl ProgressTracker {
    pub fn new(threshold: f64, window: usize, patience: usize) -> Self {
        Self {
            threshold,
            window,
            patience,
            previous: None,
            best: f64::NEG_INFINITY,
            small_changes: 0,
            since_best: 0,
        }
    }

    pub fn from_options(options: &MmieOptions) -> Self {
        Self::new(
            options.convergence_threshold,
            options.convergence_window,
            options.patience,
        )
    }

    /// Best value seen so far
    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn observe(&mut self, objective: f64) -> Step {
        let improvement = self.previous.map(|p| objective - p);
        self.previous = Some(objective);

        let new_best = objective > self.best;
        if new_best {
            self.best = objective;
            self.since_best = 0;
        } else {
            self.since_best += 1;
        }

        if let Some(delta) = improvement {
            if delta.abs() < self.threshold {
                self.small_changes += 1;
            } else {
                self.small_changes = 0;
            }
        }

        let stop = if self.small_changes >= self.window {
            Some(MmieStatus::Converged)
        } else if self.since_best >= self.patience {
            Some(MmieStatus::Stalled)
        } else {
            None
        };

        Step {
            improvement,
            new_best,
            stop,
        }
    }
}

/// Next stabilization constant: larger after a step that did not improve,
/// smaller (never below `minimum_d`) after one that did
pub fn tune_d(current_d: f64, improvement: f64, minimum_d: f64) -> f64 {
    if improvement > 0.0 {
        (current_d * D_DECREASE).max(minimum_d)
    } else {
        current_d * D_INCREASE
    }
}

/// `Σ_c n_c ln π_c`
pub fn prior_term(counts: &[usize], priors: &[f64]) -> f64 {
    counts
        .iter()
        .zip(priors)
        .filter(|(n, _)| **n > 0)
        .map(|(&n, &p)| n as f64 * p.ln())
        .sum()
}

/// Numerator and denominator statistics of one pass over all classes
#[derive(Debug, Clone)]
pub struct MmieStatistics {
    numerator: Vec<MixtureAccumulator>,
    denominator: MixtureAccumulator,
    objective: f64,
    num_examples: usize,
}

impl MmieStatistics {
    /// One pass over `data` (one matrix per class)
    pub fn accumulate(
        mixtures: &[Mixture],
        generator: &GeneratorModel,
        data: &[Array2<f64>],
        priors: &[f64],
        min_log_weight: f64,
    ) -> Result<Self> {
        let mut numerator: Vec<MixtureAccumulator> = mixtures
            .iter()
            .map(|m| MixtureAccumulator::new(m, min_log_weight))
            .collect();
        let pooled = generator.truncated(mixtures, min_log_weight);
        let mut denominator = MixtureAccumulator::new(&pooled, NO_SKIP);

        for (class, rows) in data.iter().enumerate() {
            let (mixture, acc) = match (mixtures.get(class), numerator.get_mut(class)) {
                (Some(m), Some(a)) => (m, a),
                _ => break,
            };
            acc.accumulate_rows(mixture, rows.view());
            denominator.accumulate_rows(&pooled, rows.view());
            if !acc.log_likelihood().is_finite() {
                return Err(TrainerError::NonFiniteLikelihood { class });
            }
        }

        let counts: Vec<usize> = data.iter().map(Array2::nrows).collect();
        let numerator_ll: f64 = numerator.iter().map(MixtureAccumulator::log_likelihood).sum();
        let objective = numerator_ll - denominator.log_likelihood() + prior_term(&counts, priors);
        if !objective.is_finite() {
            return Err(gaussmix_core::Error::Training(format!(
                "non-finite MMIE objective {}",
                objective
            ))
            .into());
        }

        Ok(Self {
            numerator,
            denominator,
            objective,
            num_examples: counts.iter().sum(),
        })
    }

    /// Total objective
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Objective divided by the example count
    pub fn per_pattern(&self) -> f64 {
        if self.num_examples == 0 {
            0.0
        } else {
            self.objective / self.num_examples as f64
        }
    }

    pub fn numerator(&self, class: usize) -> &MixtureAccumulator {
        &self.numerator[class]
    }

    pub fn denominator(&self) -> &MixtureAccumulator {
        &self.denominator
    }

    /// `γn − γd` for every component, grouped by class
    pub fn occupation_differences(&self, generator: &GeneratorModel) -> Vec<Vec<f64>> {
        let den = self.denominator.stats();
        self.numerator
            .iter()
            .enumerate()
            .map(|(class, acc)| {
                acc.stats()
                    .iter()
                    .enumerate()
                    .map(|(m, num)| num.occupation - den[generator.pooled_index(class, m)].occupation)
                    .collect()
            })
            .collect()
    }
}

/// Per-pattern objective of `mixtures`, measured from scratch
pub fn evaluate_objective(
    mixtures: &[Mixture],
    data: &[Array2<f64>],
    priors: &[f64],
    min_log_weight: f64,
) -> Result<f64> {
    let generator = GeneratorModel::build(mixtures, priors);
    Ok(MmieStatistics::accumulate(mixtures, &generator, data, priors, min_log_weight)?.per_pattern())
}

/// Model state at the best objective seen
#[derive(Debug, Clone, PartialEq)]
pub struct BestSnapshot {
    pub mixtures: Vec<Mixture>,
    pub generator: GeneratorModel,
    /// Per-pattern objective
    pub objective: f64,
    /// 1-based; iteration 1 is the starting model
    pub iteration: usize,
}

/// Result of one MMIE run
#[derive(Debug, Clone)]
pub struct MmieOutcome {
    pub best: BestSnapshot,
    pub status: MmieStatus,
    /// Model states evaluated
    pub iterations: usize,
    pub initial_objective: f64,
    pub final_d: f64,
    /// Per-pattern objective of every evaluated state
    pub history: Vec<f64>,
}

impl MmieOutcome {
    /// False when nothing beat the starting model
    pub fn improved(&self) -> bool {
        self.best.iteration > 1
    }

    pub fn mixtures(&self) -> &[Mixture] {
        &self.best.mixtures
    }

    pub fn best_objective(&self) -> f64 {
        self.best.objective
    }
}

/// Run MMIE from `initial` (one mixture per class) over `data`
pub fn train_mmie(
    initial: Vec<Mixture>,
    data: &[Array2<f64>],
    priors: &[f64],
    options: &MmieOptions,
) -> Result<MmieOutcome> {
    if initial.len() != data.len() || priors.len() != data.len() {
        return Err(gaussmix_core::Error::DimensionMismatch {
            expected: data.len(),
            found: initial.len().min(priors.len()),
        }
        .into());
    }
    if data.iter().all(|rows| rows.nrows() == 0) {
        return Err(gaussmix_core::Error::EmptyDataset.into());
    }

    let mut current = initial;
    let mut best: Option<BestSnapshot> = None;
    let mut tracker = ProgressTracker::from_options(options);
    let mut history = Vec::with_capacity(options.max_iterations);
    let mut d = options.minimum_d;
    let mut status = MmieStatus::IterationLimit;
    let mut iterations = 0;

    tracing::info!(
        classes = current.len(),
        components = current.iter().map(Mixture::len).sum::<usize>(),
        minimum_d = options.minimum_d,
        auto_tune_d = options.auto_tune_d,
        "Starting MMIE"
    );

    for iteration in 1..=options.max_iterations {
        iterations = iteration;
        let generator = GeneratorModel::build(&current, priors);
        let stats = MmieStatistics::accumulate(
            &current,
            &generator,
            data,
            priors,
            options.reestimation.min_log_weight,
        )?;
        let objective = stats.per_pattern();
        history.push(objective);

        let step = tracker.observe(objective);
        if step.new_best {
            best = Some(BestSnapshot {
                mixtures: current.clone(),
                generator: generator.clone(),
                objective,
                iteration,
            });
        }
        if options.auto_tune_d {
            if let Some(delta) = step.improvement {
                d = tune_d(d, delta, options.minimum_d);
            }
        }

        tracing::debug!(
            iteration,
            objective,
            improvement = step.improvement.unwrap_or(0.0),
            new_best = step.new_best,
            d,
            "MMIE iteration"
        );

        if let Some(stop) = step.stop {
            status = stop;
            break;
        }
        if iteration == options.max_iterations {
            break;
        }

        ebw_update(&mut current, &stats, &generator, d, &options.reestimation)?;
    }

    let best = best.ok_or_else(|| {
        TrainerError::Initialization("MMIE evaluated no model state".to_string())
    })?;
    let initial_objective = history.first().copied().unwrap_or(best.objective);

    tracing::info!(
        ?status,
        iterations,
        initial_objective,
        best_objective = best.objective,
        best_iteration = best.iteration,
        final_d = d,
        "MMIE finished"
    );

    Ok(MmieOutcome {
        best,
        status,
        iterations,
        initial_objective,
        final_d: d,
        history,
    })
}

/// One extended Baum-Welch step on every class with data
fn ebw_update(
    mixtures: &mut [Mixture],
    stats: &MmieStatistics,
    generator: &GeneratorModel,
    d: f64,
    params: &ReestimationParams,
) -> Result<()> {
    let den = stats.denominator().stats();
    for (class, mixture) in mixtures.iter_mut().enumerate() {
        let num = stats.numerator(class);
        if num.num_examples() == 0 {
            continue;
        }
        let pairs: Vec<(&ComponentStats, &ComponentStats)> = num
            .stats()
            .iter()
            .enumerate()
            .map(|(m, n)| (n, &den[generator.pooled_index(class, m)]))
            .collect();

        if params.update_weights {
            update_weights(mixture, &pairs, d, class)?;
        }
        if params.update_means || params.update_covariances {
            for (index, (component, &(n, g))) in
                mixture.components.iter_mut().zip(&pairs).enumerate()
            {
                update_gaussian(component, n, g, d, params, class, index)?;
            }
        }
    }
    Ok(())
}

/// `w' ∝ γn − γd + D_w·w`, with `D_w` large enough that no term goes negative
fn update_weights(
    mixture: &mut Mixture,
    pairs: &[(&ComponentStats, &ComponentStats)],
    d: f64,
    class: usize,
) -> Result<()> {
    let class_denominator: f64 = pairs.iter().map(|(_, g)| g.occupation).sum();
    let mut d_w = d * class_denominator.max(1.0);
    for (component, (n, g)) in mixture.components.iter().zip(pairs) {
        let delta = n.occupation - g.occupation;
        if component.weight > 0.0 && delta < 0.0 {
            d_w = d_w.max(2.0 * -delta / component.weight);
        }
    }

    let mut updated = Vec::with_capacity(pairs.len());
    for (index, (component, (n, g))) in mixture.components.iter().zip(pairs).enumerate() {
        if component.weight <= 0.0 {
            updated.push(0.0);
            continue;
        }
        let term = n.occupation - g.occupation + d_w * component.weight;
        if !term.is_finite() {
            return Err(TrainerError::NumericalFailure {
                class,
                component: index,
                detail: format!("EBW weight term {} with D_w = {}", term, d_w),
            });
        }
        updated.push(term.max(0.0));
    }
    let total: f64 = updated.iter().sum();
    if !(total > 0.0) {
        return Err(gaussmix_core::Error::InvalidModel(format!(
            "class {} has no positive mixture weight after EBW",
            class
        ))
        .into());
    }
    for (component, w) in mixture.components.iter_mut().zip(updated) {
        component.weight = w / total;
    }
    Ok(())
}

/// EBW mean and variance for stabilization constant `d`.
///
/// Returns `None` when the update denominator or any variance (before
/// flooring) is not positive.
fn ebw_estimate(
    gaussian: &Gaussian,
    num: &ComponentStats,
    den: &ComponentStats,
    d: f64,
    params: &ReestimationParams,
) -> Option<(Array1<f64>, Array1<f64>)> {
    let denom = num.occupation - den.occupation + d;
    if !(denom > 0.0) {
        return None;
    }

    let dim = gaussian.dimension();
    let mut mean = gaussian.mean.clone();
    let mut variance = gaussian.variance.clone();
    for i in 0..dim {
        let mu = gaussian.mean[i];
        let var = gaussian.variance[i];
        let first = (num.weighted_sum[i] - den.weighted_sum[i] + d * mu) / denom;
        let new_mean = if params.update_means { first } else { mu };
        if params.update_covariances {
            let second = (num.weighted_sum_sq[i] - den.weighted_sum_sq[i] + d * (var + mu * mu)) / denom;
            let v = second - 2.0 * new_mean * first + new_mean * new_mean;
            if !(v > 0.0) {
                return None;
            }
            variance[i] = v;
        }
        mean[i] = new_mean;
    }
    Some((mean, variance))
}

/// Smallest D, found by doubling, for which [`ebw_estimate`] succeeds
fn required_d(
    gaussian: &Gaussian,
    num: &ComponentStats,
    den: &ComponentStats,
    params: &ReestimationParams,
) -> Option<f64> {
    let mut d = (den.occupation - num.occupation).max(1e-8);
    for _ in 0..MAX_D_DOUBLINGS {
        if ebw_estimate(gaussian, num, den, d, params).is_some() {
            return Some(d);
        }
        d *= 2.0;
    }
    None
}

fn update_gaussian(
    component: &mut Component,
    num: &ComponentStats,
    den: &ComponentStats,
    d: f64,
    params: &ReestimationParams,
    class: usize,
    index: usize,
) -> Result<()> {
    if num.occupation <= NEGLIGIBLE_OCCUPATION && den.occupation <= NEGLIGIBLE_OCCUPATION {
        return Ok(());
    }

    let Some(required) = required_d(&component.gaussian, num, den, params) else {
        tracing::warn!(class, component = index, "No stabilization constant keeps variances positive; component left unchanged");
        return Ok(());
    };
    let d_component = (d * den.occupation.max(1.0)).max(2.0 * required);

    let Some((mean, mut variance)) = ebw_estimate(&component.gaussian, num, den, d_component, params)
    else {
        return Ok(());
    };
    variance.mapv_inplace(|v| v.max(params.covariance_floor));

    let gaussian = Gaussian { mean, variance };
    if !gaussian.is_finite() {
        return Err(TrainerError::NumericalFailure {
            class,
            component: index,
            detail: format!("non-finite EBW update with D = {}", d_component),
        });
    }
    component.gaussian = gaussian;
    Ok(())
}
