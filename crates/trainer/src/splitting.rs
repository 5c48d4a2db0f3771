//! MMIE-driven growth of the number of Gaussians
//!
//! Starting from one Gaussian per class, each round runs MMIE, measures
//! `γn − γd` for every Gaussian on the best state, splits the ones whose
//! difference is within `percentage` of the largest, and runs MMIE again.
//! Rounds continue while the penalized objective
//! `F − 0.5 · λ · k · ln N` improves and the model stays under its size
//! cap. The best penalized snapshot across all rounds is returned.

use gaussmix_config::constants::model::SPLIT_PERTURBATION;
use gaussmix_config::TrainingConfig;
use gaussmix_core::Mixture;
use ndarray::Array2;

use crate::mmie::{train_mmie, MmieOptions, MmieOutcome, MmieStatistics};
use crate::order::bic_score;
use crate::Result;

/// Growth limits and split selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    /// Split Gaussians whose occupation difference is at least this
    /// percentage of the largest difference
    pub percentage: f64,
    /// Stop once the total Gaussian count reaches this
    pub max_total_gaussians: usize,
    /// Per-class ceiling
    pub max_per_class: usize,
    pub lambda: f64,
    pub perturbation: f64,
}

impl SplitOptions {
    pub fn from_config(config: &TrainingConfig, num_classes: usize) -> Self {
        Self {
            percentage: config.resolved_splitting_percentage(),
            max_total_gaussians: config.resolved_mmie_max_gaussians_factor() * num_classes,
            max_per_class: config.max_gaussians_per_class,
            lambda: config.bic_lambda(),
            perturbation: SPLIT_PERTURBATION,
        }
    }
}

/// Best result of the splitting loop
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// MMIE run that produced the returned model
    pub mmie: MmieOutcome,
    /// Outcome of the very first MMIE run (one Gaussian per class)
    pub first_run_improved: bool,
    pub penalized_objective: f64,
    /// Rounds whose result was accepted
    pub accepted_rounds: usize,
    /// Rounds attempted, accepted or not
    pub rounds: usize,
    /// Splits made in accepted rounds, per class
    pub splits_per_class: Vec<usize>,
}

impl SplitOutcome {
    pub fn mixtures(&self) -> &[Mixture] {
        self.mmie.mixtures()
    }

    /// True when the returned model beats the starting model
    pub fn improved(&self) -> bool {
        self.first_run_improved || self.accepted_rounds > 0
    }
}

fn total_gaussians(mixtures: &[Mixture]) -> usize {
    mixtures.iter().map(Mixture::len).sum()
}

fn penalized(outcome: &MmieOutcome, num_examples: usize, lambda: f64) -> f64 {
    let params: usize = outcome.mixtures().iter().map(Mixture::num_parameters).sum();
    bic_score(
        outcome.best_objective() * num_examples as f64,
        params,
        num_examples,
        lambda,
    )
}

/// Pick Gaussians to split from the occupation differences of `outcome`'s best
/// state; returns `(class, component)` pairs
fn select_splits(
    outcome: &MmieOutcome,
    data: &[Array2<f64>],
    priors: &[f64],
    mmie: &MmieOptions,
    split: &SplitOptions,
) -> Result<Vec<(usize, usize)>> {
    let best = &outcome.best;
    let stats = MmieStatistics::accumulate(
        &best.mixtures,
        &best.generator,
        data,
        priors,
        mmie.reestimation.min_log_weight,
    )?;
    let differences = stats.occupation_differences(&best.generator);

    let max_difference = differences
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !(max_difference > 0.0) {
        return Ok(Vec::new());
    }
    let threshold = split.percentage / 100.0 * max_difference;

    let mut candidates: Vec<(f64, usize, usize)> = differences
        .iter()
        .enumerate()
        .flat_map(|(class, diffs)| {
            diffs
                .iter()
                .enumerate()
                .filter(move |(_, &diff)| diff > 0.0 && diff >= threshold)
                .map(move |(m, &diff)| (diff, class, m))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut budget = split
        .max_total_gaussians
        .saturating_sub(total_gaussians(&best.mixtures));
    let mut per_class: Vec<usize> = best.mixtures.iter().map(Mixture::len).collect();
    let mut chosen = Vec::new();
    for (_, class, m) in candidates {
        if budget == 0 {
            break;
        }
        let limit = split.max_per_class.min(data[class].nrows());
        if per_class[class] >= limit {
            continue;
        }
        per_class[class] += 1;
        budget -= 1;
        chosen.push((class, m));
    }
    Ok(chosen)
}

/// Run MMIE with splitting from `initial` (normally one Gaussian per class)
pub fn grow_with_mmie(
    initial: Vec<Mixture>,
    data: &[Array2<f64>],
    priors: &[f64],
    mmie: &MmieOptions,
    split: &SplitOptions,
) -> Result<SplitOutcome> {
    let num_examples: usize = data.iter().map(Array2::nrows).sum();
    let first = train_mmie(initial, data, priors, mmie)?;
    let first_run_improved = first.improved();
    let mut best_score = penalized(&first, num_examples, split.lambda);
    let mut best = first;
    let mut accepted_rounds = 0;
    let mut rounds = 0;
    let mut splits_per_class = vec![0; data.len()];

    while total_gaussians(best.mixtures()) < split.max_total_gaussians {
        let splits = select_splits(&best, data, priors, mmie, split)?;
        if splits.is_empty() {
            tracing::debug!("No Gaussian qualifies for an MMIE split");
            break;
        }

        // Resume from the best state; new components go at the end, so
        // earlier indices stay valid while splitting
        let mut candidate = best.mixtures().to_vec();
        for &(class, m) in &splits {
            candidate[class].split_component(m, split.perturbation)?;
        }
        rounds += 1;

        let next = train_mmie(candidate, data, priors, mmie)?;
        let score = penalized(&next, num_examples, split.lambda);
        tracing::info!(
            round = rounds,
            splits = splits.len(),
            total_gaussians = total_gaussians(next.mixtures()),
            penalized_objective = score,
            best_penalized_objective = best_score,
            "MMIE split round"
        );

        if score <= best_score {
            break;
        }
        best_score = score;
        best = next;
        accepted_rounds += 1;
        for &(class, _) in &splits {
            splits_per_class[class] += 1;
        }
    }

    Ok(SplitOutcome {
        mmie: best,
        first_run_improved,
        penalized_objective: best_score,
        accepted_rounds,
        rounds,
        splits_per_class,
    })
}
