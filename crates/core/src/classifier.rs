//! Generative classifier built from per-class mixtures
//!
//! The training engine returns one of these. It only answers queries:
//! raw per-class log-likelihoods, normalized posteriors, and the argmax.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::numeric::MAX_EXP_ARG;
use crate::{Error, Mixture, Result};

/// One mixture per class plus the class priors seen in training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixtureClassifier {
    mixtures: Vec<Mixture>,
    priors: Vec<f64>,
}

impl GaussianMixtureClassifier {
    /// Build a classifier; every mixture must be non-empty and share `dimension`
    pub fn new(mixtures: Vec<Mixture>, priors: Vec<f64>) -> Result<Self> {
        if mixtures.len() != priors.len() {
            return Err(Error::DimensionMismatch {
                expected: mixtures.len(),
                found: priors.len(),
            });
        }
        let dimension = mixtures.first().map(Mixture::dimension).unwrap_or(0);
        for (class, mixture) in mixtures.iter().enumerate() {
            if mixture.is_empty() {
                return Err(Error::InvalidModel(format!("class {} has no components", class)));
            }
            mixture.validate(dimension)?;
        }
        Ok(Self { mixtures, priors })
    }

    pub fn num_classes(&self) -> usize {
        self.mixtures.len()
    }

    pub fn feature_dimension(&self) -> usize {
        self.mixtures.first().map(Mixture::dimension).unwrap_or(0)
    }

    /// Mixture of one class
    pub fn mixture(&self, class: usize) -> Option<&Mixture> {
        self.mixtures.get(class)
    }

    pub fn mixtures(&self) -> &[Mixture] {
        &self.mixtures
    }

    /// Class priors from training (`n_c / N`, never exactly zero)
    pub fn priors(&self) -> &[f64] {
        &self.priors
    }

    /// Total number of Gaussians across all classes
    pub fn total_components(&self) -> usize {
        self.mixtures.iter().map(Mixture::len).sum()
    }

    /// `ln p(x | class)` for every class
    pub fn class_log_probabilities(&self, x: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        self.check_dimension(x)?;
        Ok(self.mixtures.iter().map(|m| m.log_likelihood(x)).collect())
    }

    /// Normalized per-class probabilities from the raw log-likelihoods.
    ///
    /// All log-likelihoods are shifted by one constant that puts the largest
    /// just below the `exp` overflow boundary (leaving headroom for the sum),
    /// so the winning class never exponentiates to zero or infinity.
    pub fn class_posteriors(&self, x: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        let log_probs = self.class_log_probabilities(x)?;
        let max = log_probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(Error::InvalidModel(format!(
                "no finite class log-likelihood (max = {})",
                max
            )));
        }

        let headroom = (log_probs.len() as f64).ln() + 1.0;
        let shift = MAX_EXP_ARG - headroom - max;
        let scaled: Vec<f64> = log_probs.iter().map(|&l| (l + shift).exp()).collect();
        let sum: f64 = scaled.iter().sum();
        Ok(scaled.into_iter().map(|v| v / sum).collect())
    }

    /// Class with the highest log-likelihood
    pub fn predict(&self, x: ArrayView1<'_, f64>) -> Result<usize> {
        let log_probs = self.class_log_probabilities(x)?;
        Ok(log_probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0))
    }

    fn check_dimension(&self, x: ArrayView1<'_, f64>) -> Result<()> {
        let expected = self.feature_dimension();
        if x.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: x.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gaussian;
    use ndarray::array;

    fn classifier(means: &[f64], variance: f64) -> GaussianMixtureClassifier {
        let mixtures = means
            .iter()
            .map(|&m| Mixture::single(Gaussian::new(array![m], array![variance]).unwrap()))
            .collect::<Vec<_>>();
        let priors = vec![1.0 / means.len() as f64; means.len()];
        GaussianMixtureClassifier::new(mixtures, priors).unwrap()
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let c = classifier(&[-1.0, 0.0, 1.0], 1.0);
        let post = c.class_posteriors(array![0.2].view()).unwrap();
        assert_eq!(post.len(), 3);
        assert!((post.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(c.predict(array![0.2].view()).unwrap(), 1);
    }

    #[test]
    fn test_posteriors_with_tiny_likelihoods() {
        // Both log-likelihoods are near -1.2e9; naive exponentiation gives 0/0
        let c = classifier(&[-1.0, 1.0], 1e-4);
        let post = c.class_posteriors(array![500.0].view()).unwrap();
        assert!(post.iter().all(|p| p.is_finite()));
        assert!((post[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_posteriors_with_close_likelihoods() {
        let c = classifier(&[-1.0, 1.0], 1.0);
        let post = c.class_posteriors(array![0.0].view()).unwrap();
        assert!((post[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let c = classifier(&[0.0], 1.0);
        assert!(c.class_log_probabilities(array![0.0, 1.0].view()).is_err());
    }

    #[test]
    fn test_rejects_empty_mixture() {
        let result = GaussianMixtureClassifier::new(vec![Mixture { components: vec![] }], vec![1.0]);
        assert!(result.is_err());
    }
}
