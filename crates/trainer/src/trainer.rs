//! Top-level trainer
//!
//! [`GmmTrainer`] validates its configuration once, then `train` runs the
//! maximum-likelihood stage for every class and, if configured, the MMIE
//! stage on top. The result is an immutable [`GaussianMixtureClassifier`]
//! plus a [`TrainingReport`] describing what happened.

use gaussmix_config::TrainingConfig;
use gaussmix_core::{GaussianMixtureClassifier, LabeledDataset, Mixture};
use serde::Serialize;

use crate::data::ClassData;
use crate::em::EmOptions;
use crate::init::{Initializer, KMeansInitializer};
use crate::mmie::{train_mmie, MmieOptions, MmieOutcome};
use crate::order::{ClassFit, ModelOrderController, OrderStrategy};
use crate::splitting::{grow_with_mmie, SplitOptions};
use crate::{Result, TrainerError};

/// Which training pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainingStrategy {
    /// EM only, with the configured model-order strategy
    Mle,
    /// EM to the configured size, then MMIE
    Mmie,
    /// One Gaussian per class, then MMIE with splitting
    MmieAutoSplit,
}

impl TrainingStrategy {
    pub fn from_config(config: &TrainingConfig) -> Self {
        match (config.use_mmie, config.is_automatic()) {
            (false, _) => Self::Mle,
            (true, false) => Self::Mmie,
            (true, true) => Self::MmieAutoSplit,
        }
    }
}

/// Per-class training summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub class: usize,
    pub num_examples: usize,
    pub prior: f64,
    pub num_components: usize,
    /// EM runs of the maximum-likelihood stage
    pub em_runs: usize,
    pub em_iterations: usize,
    /// Splits from model-order growth plus accepted MMIE splits
    pub splits: usize,
    /// Per-pattern log-likelihood after the MLE stage
    pub log_likelihood: f64,
    pub bic: Option<f64>,
    /// Components dropped by the final weight-floor pass
    pub discarded: usize,
}

/// MMIE stage summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MmieSummary {
    pub status: String,
    pub iterations: usize,
    pub initial_objective: f64,
    pub best_objective: f64,
    pub best_iteration: usize,
    pub final_d: f64,
    pub split_rounds: usize,
    /// MMIE never beat its starting model and the MLE result was kept
    pub fell_back_to_mle: bool,
}

/// What a training run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub strategy: TrainingStrategy,
    pub classes: Vec<ClassReport>,
    pub mmie: Option<MmieSummary>,
}

/// Trained classifier and its report
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub classifier: GaussianMixtureClassifier,
    pub report: TrainingReport,
}

/// Mixture trainer configured once, reusable across datasets
pub struct GmmTrainer {
    config: TrainingConfig,
    initializer: Box<dyn Initializer>,
}

impl std::fmt::Debug for GmmTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmmTrainer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GmmTrainer {
    /// Validate `config` and build a trainer with the default k-means initializer
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let initializer = Box::new(KMeansInitializer::with_seed(config.resolved_kmeans_seed()));
        Ok(Self {
            config,
            initializer,
        })
    }

    /// Replace the k-means collaborator
    pub fn with_initializer(mut self, initializer: Box<dyn Initializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn strategy(&self) -> TrainingStrategy {
        TrainingStrategy::from_config(&self.config)
    }

    /// Train one mixture per class on `dataset`
    pub fn train<D: LabeledDataset + ?Sized>(&self, dataset: &D) -> Result<TrainedModel> {
        let data = ClassData::from_dataset(dataset)?;
        let priors = data.priors();
        let strategy = self.strategy();

        tracing::info!(
            ?strategy,
            classes = data.num_classes(),
            examples = data.total(),
            dimension = data.dimension(),
            "Training Gaussian mixtures"
        );

        let mle_order = OrderStrategy::from_config(&self.config);
        let start_order = match strategy {
            TrainingStrategy::MmieAutoSplit => OrderStrategy::UpMix { target: 1 },
            _ => mle_order,
        };
        let (mut mixtures, mut classes) = self.fit_all(&data, &priors, start_order)?;

        let mmie = match strategy {
            TrainingStrategy::Mle => None,
            TrainingStrategy::Mmie => {
                let options = MmieOptions::from_config(&self.config);
                let outcome = train_mmie(mixtures.clone(), data.classes(), &priors, &options)?;
                let fell_back = !outcome.improved();
                if fell_back {
                    tracing::warn!(
                        initial_objective = outcome.initial_objective,
                        "MMIE did not improve on the MLE model; keeping MLE"
                    );
                } else {
                    mixtures = outcome.best.mixtures.clone();
                }
                Some(summarize(&outcome, 0, fell_back))
            }
            TrainingStrategy::MmieAutoSplit => {
                let options = MmieOptions::from_config(&self.config);
                let split = SplitOptions::from_config(&self.config, data.num_classes());
                let outcome = grow_with_mmie(mixtures.clone(), data.classes(), &priors, &options, &split)?;
                let fell_back = !outcome.improved();
                if fell_back {
                    tracing::warn!(
                        initial_objective = outcome.mmie.initial_objective,
                        "MMIE splitting did not improve on its start; falling back to MLE"
                    );
                    let (mle_mixtures, mle_classes) = self.fit_all(&data, &priors, mle_order)?;
                    mixtures = mle_mixtures;
                    classes = mle_classes;
                } else {
                    mixtures = outcome.mmie.best.mixtures.clone();
                    for (report, &splits) in classes.iter_mut().zip(&outcome.splits_per_class) {
                        report.splits += splits;
                    }
                }
                Some(summarize(&outcome.mmie, outcome.accepted_rounds, fell_back))
            }
        };

        let log_floor = self.config.log_weight_floor();
        for (mixture, report) in mixtures.iter_mut().zip(classes.iter_mut()) {
            report.discarded = mixture.discard_negligible_components(log_floor);
            report.num_components = mixture.len();
        }

        let classifier = GaussianMixtureClassifier::new(mixtures, priors)?;
        tracing::info!(
            total_components = classifier.total_components(),
            "Training finished"
        );

        Ok(TrainedModel {
            classifier,
            report: TrainingReport {
                strategy,
                classes,
                mmie,
            },
        })
    }

    /// MLE stage for every class
    fn fit_all(
        &self,
        data: &ClassData,
        priors: &[f64],
        order: OrderStrategy,
    ) -> Result<(Vec<Mixture>, Vec<ClassReport>)> {
        let controller = ModelOrderController::new(
            order,
            EmOptions::from_config(&self.config),
            self.config.covariance_floor,
            self.initializer.as_ref(),
        );

        let mut mixtures = Vec::with_capacity(data.num_classes());
        let mut reports = Vec::with_capacity(data.num_classes());
        for class in 0..data.num_classes() {
            let rows = data.class(class);
            let fit = if rows.nrows() == 0 {
                tracing::warn!(class, "Class has no training examples; using pooled statistics");
                let gaussian = data.pooled_gaussian(self.config.covariance_floor).ok_or_else(|| {
                    TrainerError::Initialization("no examples to pool".to_string())
                })?;
                ClassFit {
                    mixture: Mixture::single(gaussian),
                    log_likelihood: 0.0,
                    em_runs: 0,
                    em_iterations: 0,
                    splits: 0,
                    bic: None,
                }
            } else {
                controller.fit_class(class, rows)?
            };

            let num_examples = rows.nrows();
            tracing::debug!(
                class,
                num_examples,
                components = fit.mixture.len(),
                em_runs = fit.em_runs,
                splits = fit.splits,
                "Class fitted"
            );
            reports.push(ClassReport {
                class,
                num_examples,
                prior: priors[class],
                num_components: fit.mixture.len(),
                em_runs: fit.em_runs,
                em_iterations: fit.em_iterations,
                splits: fit.splits,
                log_likelihood: if num_examples > 0 {
                    fit.log_likelihood / num_examples as f64
                } else {
                    0.0
                },
                bic: fit.bic,
                discarded: 0,
            });
            mixtures.push(fit.mixture);
        }
        Ok((mixtures, reports))
    }
}

fn summarize(outcome: &MmieOutcome, split_rounds: usize, fell_back_to_mle: bool) -> MmieSummary {
    MmieSummary {
        status: format!("{:?}", outcome.status),
        iterations: outcome.iterations,
        initial_objective: outcome.initial_objective,
        best_objective: outcome.best_objective(),
        best_iteration: outcome.best.iteration,
        final_d: outcome.final_d,
        split_rounds,
        fell_back_to_mle,
    }
}
