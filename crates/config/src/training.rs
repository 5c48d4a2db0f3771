//! Training options
//!
//! Options that only make sense for a particular strategy are `Option`s:
//! `None` means "not requested" and resolves to the default from
//! [`crate::constants`]. Requesting one outside its strategy is a
//! configuration error, never silently ignored.

use serde::{Deserialize, Serialize};

use crate::constants::{bic, em, kmeans, mmie, model};
use crate::ConfigError;

/// How initial mixtures (and BIC growth steps) are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    /// Start from one Gaussian and split the heaviest component
    #[default]
    UpMix,
    /// Seed all components at once with k-means
    KMeans,
}

/// Everything the trainer needs to know, passed by value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Gaussians per class; 0 selects the count automatically
    #[serde(default)]
    pub target_gaussians_per_class: usize,

    /// Ceiling on Gaussians per class for automatic selection
    #[serde(default = "default_max_gaussians_per_class")]
    pub max_gaussians_per_class: usize,

    /// Initialization / growth strategy
    #[serde(default)]
    pub initialization: InitStrategy,

    /// Run EM after k-means seeding
    #[serde(default = "default_true")]
    pub kmeans_refine: bool,

    /// Seed for k-means++ (only with `initialization = k_means`)
    #[serde(default)]
    pub kmeans_seed: Option<u64>,

    /// Maximum EM iterations per fit
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// EM convergence threshold on per-pattern log-likelihood change
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Lower bound on every variance component
    #[serde(default = "default_covariance_floor")]
    pub covariance_floor: f64,

    /// Weight below which components are skipped and finally discarded
    #[serde(default = "default_mixture_weight_floor")]
    pub mixture_weight_floor: f64,

    /// Selective-freeze flags for the M-step and MMIE updates
    #[serde(default = "default_true")]
    pub update_weights: bool,
    #[serde(default = "default_true")]
    pub update_means: bool,
    #[serde(default = "default_true")]
    pub update_covariances: bool,

    /// BIC penalty weight (automatic count only)
    #[serde(default)]
    pub lambda_for_bic: Option<f64>,

    /// Refine with MMIE after MLE
    #[serde(default)]
    pub use_mmie: bool,

    /// MMIE stabilization constant lower bound
    #[serde(default)]
    pub mmie_minimum_d: Option<f64>,

    /// Adapt D between MMIE iterations
    #[serde(default)]
    pub auto_tune_d: Option<bool>,

    /// Split threshold, percent of the largest occupation difference
    /// (MMIE with automatic count only)
    #[serde(default)]
    pub mmie_splitting_percentage: Option<f64>,

    #[serde(default)]
    pub mmie_max_iterations: Option<usize>,

    #[serde(default)]
    pub mmie_convergence_threshold: Option<f64>,

    /// Consecutive small improvements required for MMIE convergence
    #[serde(default)]
    pub mmie_convergence_window: Option<usize>,

    /// Iterations without a new best before MMIE aborts
    #[serde(default)]
    pub mmie_patience: Option<usize>,

    /// MMIE splitting stops at this many Gaussians per class on average
    #[serde(default)]
    pub mmie_max_gaussians_factor: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_max_gaussians_per_class() -> usize {
    model::MAX_GAUSSIANS_PER_CLASS
}

fn default_max_iterations() -> usize {
    em::MAX_ITERATIONS
}

fn default_convergence_threshold() -> f64 {
    em::CONVERGENCE_THRESHOLD
}

fn default_covariance_floor() -> f64 {
    model::COVARIANCE_FLOOR
}

fn default_mixture_weight_floor() -> f64 {
    model::MIXTURE_WEIGHT_FLOOR
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_gaussians_per_class: 0,
            max_gaussians_per_class: default_max_gaussians_per_class(),
            initialization: InitStrategy::default(),
            kmeans_refine: true,
            kmeans_seed: None,
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            covariance_floor: default_covariance_floor(),
            mixture_weight_floor: default_mixture_weight_floor(),
            update_weights: true,
            update_means: true,
            update_covariances: true,
            lambda_for_bic: None,
            use_mmie: false,
            mmie_minimum_d: None,
            auto_tune_d: None,
            mmie_splitting_percentage: None,
            mmie_max_iterations: None,
            mmie_convergence_threshold: None,
            mmie_convergence_window: None,
            mmie_patience: None,
            mmie_max_gaussians_factor: None,
        }
    }
}

impl TrainingConfig {
    /// Fixed Gaussian count
    pub fn with_target(target_gaussians_per_class: usize) -> Self {
        Self {
            target_gaussians_per_class,
            ..Self::default()
        }
    }

    /// True when the number of Gaussians is chosen automatically
    pub fn is_automatic(&self) -> bool {
        self.target_gaussians_per_class == 0
    }

    /// `ln(mixture_weight_floor)`
    pub fn log_weight_floor(&self) -> f64 {
        self.mixture_weight_floor.ln()
    }

    pub fn bic_lambda(&self) -> f64 {
        self.lambda_for_bic.unwrap_or(bic::DEFAULT_LAMBDA)
    }

    pub fn resolved_kmeans_seed(&self) -> u64 {
        self.kmeans_seed.unwrap_or(kmeans::SEED)
    }

    pub fn resolved_mmie_minimum_d(&self) -> f64 {
        self.mmie_minimum_d.unwrap_or(mmie::MINIMUM_D)
    }

    pub fn resolved_auto_tune_d(&self) -> bool {
        self.auto_tune_d.unwrap_or(true)
    }

    pub fn resolved_splitting_percentage(&self) -> f64 {
        self.mmie_splitting_percentage
            .unwrap_or(mmie::SPLITTING_PERCENTAGE)
    }

    pub fn resolved_mmie_max_iterations(&self) -> usize {
        self.mmie_max_iterations.unwrap_or(mmie::MAX_ITERATIONS)
    }

    pub fn resolved_mmie_convergence_threshold(&self) -> f64 {
        self.mmie_convergence_threshold
            .unwrap_or(mmie::CONVERGENCE_THRESHOLD)
    }

    pub fn resolved_mmie_convergence_window(&self) -> usize {
        self.mmie_convergence_window
            .unwrap_or(mmie::CONVERGENCE_WINDOW)
    }

    pub fn resolved_mmie_patience(&self) -> usize {
        self.mmie_patience.unwrap_or(mmie::PATIENCE)
    }

    pub fn resolved_mmie_max_gaussians_factor(&self) -> usize {
        self.mmie_max_gaussians_factor
            .unwrap_or(mmie::MAX_GAUSSIANS_FACTOR)
    }

    /// Validate ranges and option combinations
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_em()?;
        self.validate_model()?;
        self.validate_selection()?;
        self.validate_mmie()?;
        Ok(())
    }

    fn validate_em(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "Must be at least 1".to_string()));
        }
        if !(self.convergence_threshold > 0.0 && self.convergence_threshold.is_finite()) {
            return Err(invalid(
                "convergence_threshold",
                format!("Must be positive, got {}", self.convergence_threshold),
            ));
        }
        if !(self.update_weights || self.update_means || self.update_covariances) {
            return Err(invalid(
                "update_weights/update_means/update_covariances",
                "At least one parameter kind must be updated".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_model(&self) -> Result<(), ConfigError> {
        if !(self.covariance_floor > 0.0 && self.covariance_floor.is_finite()) {
            return Err(invalid(
                "covariance_floor",
                format!("Must be positive, got {}", self.covariance_floor),
            ));
        }
        if !(self.mixture_weight_floor > 0.0 && self.mixture_weight_floor < 1.0) {
            return Err(invalid(
                "mixture_weight_floor",
                format!(
                    "Must be between 0.0 and 1.0 (exclusive), got {}",
                    self.mixture_weight_floor
                ),
            ));
        }
        if self.max_gaussians_per_class == 0 {
            return Err(invalid(
                "max_gaussians_per_class",
                "Must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_selection(&self) -> Result<(), ConfigError> {
        if let Some(lambda) = self.lambda_for_bic {
            if !self.is_automatic() {
                return Err(conflict(
                    "lambda_for_bic",
                    "target_gaussians_per_class = 0 (automatic count)",
                ));
            }
            if !(lambda >= 0.0 && lambda.is_finite()) {
                return Err(invalid(
                    "lambda_for_bic",
                    format!("Must be non-negative, got {}", lambda),
                ));
            }
        }
        if self.kmeans_seed.is_some() && self.initialization != InitStrategy::KMeans {
            return Err(conflict("kmeans_seed", "initialization = k_means"));
        }
        Ok(())
    }

    fn validate_mmie(&self) -> Result<(), ConfigError> {
        let requested = [
            ("mmie_minimum_d", self.mmie_minimum_d.is_some()),
            ("auto_tune_d", self.auto_tune_d.is_some()),
            ("mmie_splitting_percentage", self.mmie_splitting_percentage.is_some()),
            ("mmie_max_iterations", self.mmie_max_iterations.is_some()),
            ("mmie_convergence_threshold", self.mmie_convergence_threshold.is_some()),
            ("mmie_convergence_window", self.mmie_convergence_window.is_some()),
            ("mmie_patience", self.mmie_patience.is_some()),
            ("mmie_max_gaussians_factor", self.mmie_max_gaussians_factor.is_some()),
        ];
        if !self.use_mmie {
            if let Some((option, _)) = requested.iter().find(|(_, set)| *set) {
                return Err(conflict(option, "use_mmie = true"));
            }
            return Ok(());
        }

        if let Some(d) = self.mmie_minimum_d {
            if !(d > 0.0 && d.is_finite()) {
                return Err(invalid("mmie_minimum_d", format!("Must be positive, got {}", d)));
            }
        }
        if let Some(pct) = self.mmie_splitting_percentage {
            if !self.is_automatic() {
                return Err(conflict(
                    "mmie_splitting_percentage",
                    "target_gaussians_per_class = 0 (automatic count)",
                ));
            }
            if !(pct > 0.0 && pct <= 100.0) {
                return Err(invalid(
                    "mmie_splitting_percentage",
                    format!("Must be in (0, 100], got {}", pct),
                ));
            }
        }
        if self.mmie_max_gaussians_factor.is_some() && !self.is_automatic() {
            return Err(conflict(
                "mmie_max_gaussians_factor",
                "target_gaussians_per_class = 0 (automatic count)",
            ));
        }
        if self.mmie_max_iterations == Some(0) {
            return Err(invalid("mmie_max_iterations", "Must be at least 1".to_string()));
        }
        if let Some(threshold) = self.mmie_convergence_threshold {
            if !(threshold > 0.0 && threshold.is_finite()) {
                return Err(invalid(
                    "mmie_convergence_threshold",
                    format!("Must be positive, got {}", threshold),
                ));
            }
        }
        if self.mmie_convergence_window == Some(0) {
            return Err(invalid(
                "mmie_convergence_window",
                "Must be at least 1".to_string(),
            ));
        }
        if self.mmie_patience == Some(0) {
            return Err(invalid("mmie_patience", "Must be at least 1".to_string()));
        }
        if self.mmie_max_gaussians_factor == Some(0) {
            return Err(invalid(
                "mmie_max_gaussians_factor",
                "Must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

fn conflict(option: &str, requires: &str) -> ConfigError {
    ConfigError::Conflict {
        option: option.to_string(),
        requires: requires.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_automatic());
        assert_eq!(config.bic_lambda(), bic::DEFAULT_LAMBDA);
    }

    #[test]
    fn test_lambda_requires_automatic_count() {
        let mut config = TrainingConfig::with_target(4);
        config.lambda_for_bic = Some(1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Conflict { ref option, .. }) if option == "lambda_for_bic"
        ));

        config.target_gaussians_per_class = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mmie_options_require_mmie() {
        let mut config = TrainingConfig::default();
        config.mmie_minimum_d = Some(5.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Conflict { ref option, .. }) if option == "mmie_minimum_d"
        ));

        config.use_mmie = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_tune_requires_mmie() {
        let mut config = TrainingConfig::default();
        config.auto_tune_d = Some(false);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_splitting_percentage_requires_automatic_count() {
        let mut config = TrainingConfig::with_target(2);
        config.use_mmie = true;
        config.mmie_splitting_percentage = Some(30.0);
        assert!(config.validate().is_err());

        config.target_gaussians_per_class = 0;
        assert!(config.validate().is_ok());

        config.mmie_splitting_percentage = Some(150.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kmeans_seed_requires_kmeans() {
        let mut config = TrainingConfig::default();
        config.kmeans_seed = Some(7);
        assert!(config.validate().is_err());

        config.initialization = InitStrategy::KMeans;
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_kmeans_seed(), 7);
    }

    #[test]
    fn test_range_validation() {
        let mut config = TrainingConfig::default();
        config.covariance_floor = 0.0;
        assert!(config.validate().is_err());
        config.covariance_floor = model::COVARIANCE_FLOOR;

        config.mixture_weight_floor = 1.0;
        assert!(config.validate().is_err());
        config.mixture_weight_floor = model::MIXTURE_WEIGHT_FLOOR;

        config.max_iterations = 0;
        assert!(config.validate().is_err());
        config.max_iterations = 10;

        config.convergence_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_updates_frozen_is_rejected() {
        let mut config = TrainingConfig::default();
        config.update_weights = false;
        config.update_means = false;
        config.update_covariances = false;
        assert!(config.validate().is_err());

        config.update_covariances = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_strategy_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            init: InitStrategy,
        }
        let parsed: Wrapper = toml::from_str("init = \"k_means\"").unwrap();
        assert_eq!(parsed.init, InitStrategy::KMeans);
    }
}
