//! Centralized defaults for mixture training
//!
//! Single source of truth for default option values and the fixed numeric
//! constants of the training algorithms. Config structs and trainer code
//! both read from here instead of repeating literals.

/// EM reestimation defaults
pub mod em {
    /// Maximum EM iterations per fit
    pub const MAX_ITERATIONS: usize = 100;

    /// Per-pattern log-likelihood change below which EM has converged
    pub const CONVERGENCE_THRESHOLD: f64 = 1e-4;

    /// Occupation counts at or below this are treated as zero in the M-step
    pub const NEGLIGIBLE_OCCUPATION: f64 = 1e-10;

    /// Responsibilities below this are not accumulated
    pub const MIN_RESPONSIBILITY: f64 = 1e-12;
}

/// Mixture model defaults
pub mod model {
    /// Lower bound on every variance component
    pub const COVARIANCE_FLOOR: f64 = 1e-4;

    /// Components lighter than this are skipped during accumulation and
    /// removed after training
    pub const MIXTURE_WEIGHT_FLOOR: f64 = 1e-5;

    /// Upper bound on Gaussians per class when the count is automatic
    pub const MAX_GAUSSIANS_PER_CLASS: usize = 32;

    /// Mean shift of a split duplicate, in standard deviations
    pub const SPLIT_PERTURBATION: f64 = 0.2;

    /// Prior assigned to a class with no training examples
    pub const MIN_CLASS_PRIOR: f64 = 1e-6;
}

/// BIC model selection
pub mod bic {
    /// Penalty weight λ in `LL - 0.5 λ k ln n`
    pub const DEFAULT_LAMBDA: f64 = 1.0;
}

/// MMIE discriminative training
pub mod mmie {
    /// Smallest allowed stabilization constant D (also the starting value)
    pub const MINIMUM_D: f64 = 2.0;

    /// D multiplier after an iteration that did not improve the objective
    pub const D_INCREASE: f64 = 2.0;

    /// D multiplier after an improving iteration
    pub const D_DECREASE: f64 = 0.9;

    /// Maximum MMIE iterations per run
    pub const MAX_ITERATIONS: usize = 50;

    /// Per-pattern objective change treated as "no change"
    pub const CONVERGENCE_THRESHOLD: f64 = 1e-4;

    /// Consecutive small changes needed to declare convergence
    pub const CONVERGENCE_WINDOW: usize = 3;

    /// Iterations without a new best before aborting
    pub const PATIENCE: usize = 10;

    /// Split Gaussians whose occupation difference exceeds this percentage
    /// of the largest difference
    pub const SPLITTING_PERCENTAGE: f64 = 50.0;

    /// Splitting stops once total Gaussians reach this multiple of the class count
    pub const MAX_GAUSSIANS_FACTOR: usize = 8;

    /// Doublings tried when searching for a D that keeps variances positive
    pub const MAX_D_DOUBLINGS: usize = 64;
}

/// k-means initializer
pub mod kmeans {
    /// Lloyd iterations
    pub const MAX_ITERATIONS: usize = 50;

    /// RNG seed for k-means++ seeding
    pub const SEED: u64 = 42;

    /// Stop when no centroid moves further than this (squared distance)
    pub const TOLERANCE: f64 = 1e-8;
}
