//! Model-order control: how many Gaussians each class gets
//!
//! Strategies are a closed set chosen from [`TrainingConfig`]. Every
//! strategy runs per class and independently of the others.

use gaussmix_config::constants::model::SPLIT_PERTURBATION;
use gaussmix_config::{InitStrategy, TrainingConfig};
use gaussmix_core::Mixture;
use ndarray::ArrayView2;

use crate::em::{fit_class as run_em, EmOptions};
use crate::init::{single_gaussian, Initializer};
use crate::{Result, TrainerError};

/// How a BIC search proposes the next larger model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Split the heaviest component of the current model
    Split,
    /// Re-seed from scratch with one more cluster
    KMeans,
}

/// Model-order strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderStrategy {
    /// Single Gaussian, then split the heaviest component until `target`
    UpMix { target: usize },
    /// All `target` components at once from the initializer
    KMeansSeed { target: usize, refine: bool },
    /// Grow while the BIC score improves
    Bic {
        lambda: f64,
        growth: Growth,
        max_components: usize,
    },
}

impl OrderStrategy {
    pub fn from_config(config: &TrainingConfig) -> Self {
        let target = config.target_gaussians_per_class;
        match (config.is_automatic(), config.initialization) {
            (false, InitStrategy::UpMix) => Self::UpMix { target },
            (false, InitStrategy::KMeans) => Self::KMeansSeed {
                target,
                refine: config.kmeans_refine,
            },
            (true, init) => Self::Bic {
                lambda: config.bic_lambda(),
                growth: match init {
                    InitStrategy::UpMix => Growth::Split,
                    InitStrategy::KMeans => Growth::KMeans,
                },
                max_components: config.max_gaussians_per_class,
            },
        }
    }
}

/// What one class fit produced
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFit {
    pub mixture: Mixture,
    /// Total log-likelihood of the class data under `mixture`
    pub log_likelihood: f64,
    /// Number of EM runs (each to convergence or the iteration cap)
    pub em_runs: usize,
    /// EM iterations summed over all runs
    pub em_iterations: usize,
    pub splits: usize,
    /// BIC of the returned model (BIC strategy only)
    pub bic: Option<f64>,
}

/// `LL − 0.5 · λ · k · ln n`
pub fn bic_score(log_likelihood: f64, num_parameters: usize, num_examples: usize, lambda: f64) -> f64 {
    log_likelihood - 0.5 * lambda * num_parameters as f64 * (num_examples as f64).ln()
}

/// Runs one [`OrderStrategy`] for a class
pub struct ModelOrderController<'a> {
    strategy: OrderStrategy,
    em: EmOptions,
    covariance_floor: f64,
    initializer: &'a dyn Initializer,
}

impl<'a> ModelOrderController<'a> {
    pub fn new(
        strategy: OrderStrategy,
        em: EmOptions,
        covariance_floor: f64,
        initializer: &'a dyn Initializer,
    ) -> Self {
        Self {
            strategy,
            em,
            covariance_floor,
            initializer,
        }
    }

    pub fn strategy(&self) -> OrderStrategy {
        self.strategy
    }

    /// Fit one class. `data` must hold at least one example.
    pub fn fit_class(&self, class: usize, data: ArrayView2<'_, f64>) -> Result<ClassFit> {
        if data.nrows() == 0 {
            return Err(TrainerError::Initialization(format!(
                "class {} has no examples",
                class
            )));
        }
        match self.strategy {
            OrderStrategy::UpMix { target } => self.up_mix(class, data, target),
            OrderStrategy::KMeansSeed { target, refine } => self.kmeans_seed(class, data, target, refine),
            OrderStrategy::Bic {
                lambda,
                growth,
                max_components,
            } => self.bic(class, data, lambda, growth, max_components),
        }
    }

    fn up_mix(&self, class: usize, data: ArrayView2<'_, f64>, target: usize) -> Result<ClassFit> {
        let target = cap_target(class, target, data.nrows());
        let mut mixture = single_gaussian(data, self.covariance_floor)?;
        let mut outcome = run_em(&mut mixture, data, &self.em, class)?;
        let mut em_runs = 1;
        let mut em_iterations = outcome.iterations;
        let mut splits = 0;

        while mixture.len() < target {
            if mixture.split_gaussian_with_largest_weight(SPLIT_PERTURBATION).is_none() {
                break;
            }
            splits += 1;
            outcome = run_em(&mut mixture, data, &self.em, class)?;
            em_runs += 1;
            em_iterations += outcome.iterations;
            tracing::debug!(
                class,
                components = mixture.len(),
                log_likelihood = outcome.log_likelihood,
                "Up-mix split"
            );
        }

        Ok(ClassFit {
            mixture,
            log_likelihood: outcome.log_likelihood,
            em_runs,
            em_iterations,
            splits,
            bic: None,
        })
    }

    fn kmeans_seed(
        &self,
        class: usize,
        data: ArrayView2<'_, f64>,
        target: usize,
        refine: bool,
    ) -> Result<ClassFit> {
        let target = cap_target(class, target, data.nrows());
        let mut mixture = self.initializer.initialize(data, target, self.covariance_floor)?;
        if mixture.len() != target {
            return Err(TrainerError::Initialization(format!(
                "initializer returned {} components for class {}, expected {}",
                mixture.len(),
                class,
                target
            )));
        }

        let (log_likelihood, em_runs, em_iterations) = if refine {
            let outcome = run_em(&mut mixture, data, &self.em, class)?;
            (outcome.log_likelihood, 1, outcome.iterations)
        } else {
            (crate::em::total_log_likelihood(&mixture, data), 0, 0)
        };

        Ok(ClassFit {
            mixture,
            log_likelihood,
            em_runs,
            em_iterations,
            splits: 0,
            bic: None,
        })
    }

    fn bic(
        &self,
        class: usize,
        data: ArrayView2<'_, f64>,
        lambda: f64,
        growth: Growth,
        max_components: usize,
    ) -> Result<ClassFit> {
        let n = data.nrows();
        let max_components = if max_components > n {
            tracing::warn!(
                class,
                max_components,
                num_examples = n,
                "Class has fewer examples than the BIC component limit; capping"
            );
            n
        } else {
            max_components
        };

        let mut mixture = single_gaussian(data, self.covariance_floor)?;
        let outcome = run_em(&mut mixture, data, &self.em, class)?;
        let mut best = ClassFit {
            bic: Some(bic_score(outcome.log_likelihood, mixture.num_parameters(), n, lambda)),
            log_likelihood: outcome.log_likelihood,
            em_runs: 1,
            em_iterations: outcome.iterations,
            splits: 0,
            mixture,
        };
        let mut em_runs = best.em_runs;
        let mut em_iterations = best.em_iterations;

        while best.mixture.len() < max_components {
            let mut candidate = match growth {
                Growth::Split => {
                    let mut grown = best.mixture.clone();
                    if grown.split_gaussian_with_largest_weight(SPLIT_PERTURBATION).is_none() {
                        break;
                    }
                    grown
                }
                Growth::KMeans => self.initializer.initialize(
                    data,
                    best.mixture.len() + 1,
                    self.covariance_floor,
                )?,
            };
            let outcome = run_em(&mut candidate, data, &self.em, class)?;
            em_runs += 1;
            em_iterations += outcome.iterations;

            let score = bic_score(outcome.log_likelihood, candidate.num_parameters(), n, lambda);
            let previous = best.bic.unwrap_or(f64::NEG_INFINITY);
            tracing::debug!(
                class,
                components = candidate.len(),
                bic = score,
                previous_bic = previous,
                "BIC growth step"
            );
            if score <= previous {
                break;
            }

            best = ClassFit {
                mixture: candidate,
                log_likelihood: outcome.log_likelihood,
                em_runs,
                em_iterations,
                splits: best.splits + usize::from(growth == Growth::Split),
                bic: Some(score),
            };
        }

        best.em_runs = em_runs;
        best.em_iterations = em_iterations;
        Ok(best)
    }
}

/// Never ask for more Gaussians than a class has examples
fn cap_target(class: usize, target: usize, num_examples: usize) -> usize {
    if target > num_examples {
        tracing::warn!(
            class,
            requested = target,
            num_examples,
            "Class has fewer examples than requested Gaussians; capping"
        );
        num_examples
    } else {
        target.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::KMeansInitializer;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn two_clusters() -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(11);
        let mut values = Vec::with_capacity(400);
        for center in [-5.0, 5.0] {
            let normal = Normal::new(center, 0.7).unwrap();
            values.extend((0..200).map(|_| normal.sample(&mut rng)));
        }
        Array2::from_shape_vec((400, 1), values).unwrap()
    }

    fn controller(strategy: OrderStrategy, init: &KMeansInitializer) -> ModelOrderController<'_> {
        ModelOrderController::new(strategy, EmOptions::default(), 1e-4, init)
    }

    #[test]
    fn test_strategy_from_config() {
        let config = TrainingConfig::with_target(4);
        assert_eq!(OrderStrategy::from_config(&config), OrderStrategy::UpMix { target: 4 });

        let mut config = TrainingConfig::default();
        config.initialization = InitStrategy::KMeans;
        assert!(matches!(
            OrderStrategy::from_config(&config),
            OrderStrategy::Bic { growth: Growth::KMeans, .. }
        ));
    }

    #[test]
    fn test_up_mix_target_one_does_not_split() {
        let init = KMeansInitializer::default();
        let fit = controller(OrderStrategy::UpMix { target: 1 }, &init)
            .fit_class(0, two_clusters().view())
            .unwrap();
        assert_eq!(fit.mixture.len(), 1);
        assert_eq!(fit.splits, 0);
        assert_eq!(fit.em_runs, 1);
    }

    #[test]
    fn test_up_mix_reaches_target() {
        let init = KMeansInitializer::default();
        let fit = controller(OrderStrategy::UpMix { target: 4 }, &init)
            .fit_class(0, two_clusters().view())
            .unwrap();
        assert_eq!(fit.mixture.len(), 4);
        assert_eq!(fit.splits, 3);
    }

    #[test]
    fn test_degenerate_class_is_capped() {
        let init = KMeansInitializer::default();
        let data = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        let fit = controller(OrderStrategy::KMeansSeed { target: 5, refine: false }, &init)
            .fit_class(0, data.view())
            .unwrap();
        assert_eq!(fit.mixture.len(), 2);
    }

    #[test]
    fn test_bic_picks_two_components() {
        let init = KMeansInitializer::default();
        for growth in [Growth::Split, Growth::KMeans] {
            let strategy = OrderStrategy::Bic {
                lambda: 1.0,
                growth,
                max_components: 8,
            };
            let fit = controller(strategy, &init)
                .fit_class(0, two_clusters().view())
                .unwrap();
            assert_eq!(fit.mixture.len(), 2, "{:?}", growth);
            assert!(fit.bic.is_some());
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bic_limit_capped_by_class_size_with_warning() {
        let init = KMeansInitializer::default();
        let data = Array2::from_shape_vec((3, 1), vec![-1.0, 0.0, 4.0]).unwrap();
        let strategy = OrderStrategy::Bic {
            lambda: 0.0,
            growth: Growth::Split,
            max_components: 8,
        };

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let fit = tracing::subscriber::with_default(subscriber, || {
            controller(strategy, &init).fit_class(2, data.view())
        })
        .unwrap();

        assert!(fit.mixture.len() <= 3);
        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("WARN"));
        assert!(text.contains("BIC component limit"));
    }

    #[test]
    fn test_bic_score_penalizes_parameters() {
        let a = bic_score(-100.0, 3, 100, 1.0);
        let b = bic_score(-100.0, 6, 100, 1.0);
        assert!(a > b);
        assert_eq!(bic_score(-100.0, 6, 100, 0.0), -100.0);
    }
}
