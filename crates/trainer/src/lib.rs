//! Training engine for per-class Gaussian mixture classifiers
//!
//! Features:
//! - Sufficient-statistics accumulation and EM reestimation (MLE)
//! - Model-order control: up-mix splitting, k-means seeding, BIC-guided growth
//! - MMIE discriminative reestimation with extended Baum-Welch updates,
//!   adaptive stabilization and best-snapshot rollback
//! - MMIE-driven automatic splitting
//! - Tracing initialization for binaries embedding the trainer
//!
//! Entry point: [`GmmTrainer`].

pub mod accumulator;
pub mod data;
pub mod em;
pub mod generator;
pub mod init;
pub mod mmie;
pub mod order;
pub mod splitting;
pub mod telemetry;
pub mod trainer;

pub use accumulator::{ComponentStats, MixtureAccumulator, ReestimationParams, ReestimationSummary};
pub use data::ClassData;
pub use em::{fit_class, total_log_likelihood, EmOptions, EmOutcome};
pub use generator::GeneratorModel;
pub use init::{single_gaussian, Initializer, KMeansInitializer};
pub use mmie::{
    evaluate_objective, train_mmie, BestSnapshot, MmieOptions, MmieOutcome, MmieStatistics,
    MmieStatus, ProgressTracker,
};
pub use order::{bic_score, ClassFit, Growth, ModelOrderController, OrderStrategy};
pub use splitting::{grow_with_mmie, SplitOptions, SplitOutcome};
pub use telemetry::init_tracing;
pub use trainer::{
    ClassReport, GmmTrainer, MmieSummary, TrainedModel, TrainingReport, TrainingStrategy,
};

use thiserror::Error;

/// Training errors
#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Configuration error: {0}")]
    Config(#[from] gaussmix_config::ConfigError),

    #[error(transparent)]
    Core(#[from] gaussmix_core::Error),

    #[error("Numerical failure in class {class}, component {component}: {detail}")]
    NumericalFailure {
        class: usize,
        component: usize,
        detail: String,
    },

    #[error("Non-finite log-likelihood for class {class}")]
    NonFiniteLikelihood { class: usize },

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl From<TrainerError> for gaussmix_core::Error {
    fn from(err: TrainerError) -> Self {
        match err {
            TrainerError::Core(inner) => inner,
            other => gaussmix_core::Error::Training(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
