//! Weighted mixture of diagonal Gaussians
//!
//! One mixture models the density of one class. Likelihoods and
//! responsibilities are computed in the log domain with a max-shifted
//! log-sum-exp, since component log-densities can sit thousands of nats apart.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::numeric::{log_sum_exp, LOG_ZERO};
use crate::{Error, Gaussian, Result};

/// A Gaussian and its mixture weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub weight: f64,
    pub gaussian: Gaussian,
}

impl Component {
    pub fn new(weight: f64, gaussian: Gaussian) -> Self {
        Self { weight, gaussian }
    }

    /// `ln(weight)`, or [`LOG_ZERO`] for a zero weight
    #[inline]
    pub fn log_weight(&self) -> f64 {
        if self.weight > 0.0 {
            self.weight.ln()
        } else {
            LOG_ZERO
        }
    }
}

/// Ordered list of weighted Gaussians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixture {
    pub components: Vec<Component>,
}

impl Mixture {
    /// Create a mixture from components that share one dimension
    pub fn new(components: Vec<Component>) -> Result<Self> {
        let mixture = Self { components };
        if let Some(first) = mixture.components.first() {
            mixture.validate(first.gaussian.dimension())?;
        }
        Ok(mixture)
    }

    /// Mixture holding a single Gaussian with weight 1
    pub fn single(gaussian: Gaussian) -> Self {
        Self {
            components: vec![Component::new(1.0, gaussian)],
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Feature dimension (0 for an empty mixture)
    pub fn dimension(&self) -> usize {
        self.components
            .first()
            .map(|c| c.gaussian.dimension())
            .unwrap_or(0)
    }

    /// Free parameters counted for BIC: `count * (2D + 1)`
    pub fn num_parameters(&self) -> usize {
        self.len() * (2 * self.dimension() + 1)
    }

    /// Sum of all weights
    pub fn total_weight(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    /// Rescale weights to sum to one. A mixture whose weights are all zero
    /// is reset to uniform weights.
    pub fn normalize_weights(&mut self) {
        let total = self.total_weight();
        if total > 0.0 && total.is_finite() {
            for c in &mut self.components {
                c.weight /= total;
            }
        } else if !self.components.is_empty() {
            let uniform = 1.0 / self.components.len() as f64;
            for c in &mut self.components {
                c.weight = uniform;
            }
        }
    }

    /// Check every component has `dimension` and sane parameters
    pub fn validate(&self, dimension: usize) -> Result<()> {
        for c in &self.components {
            let g = &c.gaussian;
            if g.mean.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    found: g.mean.len(),
                });
            }
            if g.variance.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    found: g.variance.len(),
                });
            }
            if c.weight < 0.0 || c.weight.is_nan() || !g.is_finite() {
                return Err(Error::InvalidModel(
                    "mixture weights must be non-negative and parameters finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `ln w_m + ln N_m(x)` per component; components whose log-weight is
    /// below `min_log_weight` score [`LOG_ZERO`] without evaluating the density.
    pub fn component_log_scores(&self, x: ArrayView1<'_, f64>, min_log_weight: f64) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| {
                let log_weight = c.log_weight();
                if log_weight < min_log_weight || log_weight == LOG_ZERO {
                    LOG_ZERO
                } else {
                    log_weight + c.gaussian.log_density(x)
                }
            })
            .collect()
    }

    /// `ln Σ_m w_m N_m(x)`
    pub fn log_likelihood(&self, x: ArrayView1<'_, f64>) -> f64 {
        log_sum_exp(&self.component_log_scores(x, f64::NEG_INFINITY))
    }

    /// Per-component posterior responsibilities for `x`
    pub fn component_responsibilities(
        &self,
        x: ArrayView1<'_, f64>,
        min_log_weight: f64,
    ) -> Vec<f64> {
        self.responsibilities_with_log_likelihood(x, min_log_weight).0
    }

    /// Responsibilities and the log-likelihood from one pass over the components.
    ///
    /// A responsibility that underflows comes out as exactly 0. When every
    /// component is skipped the log-likelihood is [`LOG_ZERO`] and all
    /// responsibilities are 0.
    pub fn responsibilities_with_log_likelihood(
        &self,
        x: ArrayView1<'_, f64>,
        min_log_weight: f64,
    ) -> (Vec<f64>, f64) {
        let mut scores = self.component_log_scores(x, min_log_weight);
        let log_likelihood = log_sum_exp(&scores);
        if log_likelihood == LOG_ZERO || !log_likelihood.is_finite() {
            scores.iter_mut().for_each(|s| *s = 0.0);
            return (scores, log_likelihood);
        }
        for s in scores.iter_mut() {
            *s = if *s == LOG_ZERO {
                0.0
            } else {
                (*s - log_likelihood).exp()
            };
        }
        (scores, log_likelihood)
    }

    /// Remove components whose log-weight falls below `log_weight_floor` and
    /// renormalize the rest. The heaviest component always survives.
    ///
    /// Only call this once training is finished; accumulator indices are tied
    /// to component positions while a pass is running.
    pub fn discard_negligible_components(&mut self, log_weight_floor: f64) -> usize {
        let keep = self.largest_weight_index();
        let before = self.components.len();
        let mut index = 0;
        self.components.retain(|c| {
            let retained = Some(index) == keep || c.log_weight() >= log_weight_floor;
            index += 1;
            retained
        });
        let removed = before - self.components.len();
        if removed > 0 {
            self.normalize_weights();
            tracing::debug!(removed, remaining = self.components.len(), "Discarded negligible components");
        }
        removed
    }

    /// Index of the heaviest component (first one on ties)
    pub fn largest_weight_index(&self) -> Option<usize> {
        self.components
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, c)| match best {
                Some((_, w)) if w >= c.weight => best,
                _ => Some((i, c.weight)),
            })
            .map(|(i, _)| i)
    }

    /// Duplicate component `index`, halving its weight between the two copies.
    /// The duplicate's mean moves by `perturbation` standard deviations in
    /// every dimension. Returns the duplicate's index (always the last).
    pub fn split_component(&mut self, index: usize, perturbation: f64) -> Result<usize> {
        let original = self.components.get_mut(index).ok_or_else(|| {
            Error::InvalidModel(format!("no component {} to split", index))
        })?;
        original.weight *= 0.5;

        let mut duplicate = original.clone();
        let shift = duplicate.gaussian.std_dev() * perturbation;
        duplicate.gaussian.mean += &shift;

        self.components.push(duplicate);
        Ok(self.components.len() - 1)
    }

    /// Split the highest-weight component; `None` for an empty mixture
    pub fn split_gaussian_with_largest_weight(&mut self, perturbation: f64) -> Option<usize> {
        let index = self.largest_weight_index()?;
        self.split_component(index, perturbation).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_component() -> Mixture {
        Mixture::new(vec![
            Component::new(0.25, Gaussian::new(array![-1.0], array![1.0]).unwrap()),
            Component::new(0.75, Gaussian::new(array![2.0], array![0.5]).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_log_likelihood_matches_direct_sum() {
        let m = two_component();
        let x = array![0.5];
        let direct: f64 = m
            .components
            .iter()
            .map(|c| c.weight * c.gaussian.log_density(x.view()).exp())
            .sum();
        assert!((m.log_likelihood(x.view()) - direct.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_responsibilities_sum_to_one() {
        let m = two_component();
        let (resp, ll) = m.responsibilities_with_log_likelihood(array![0.3].view(), LOG_ZERO);
        assert!((resp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((ll - m.log_likelihood(array![0.3].view())).abs() < 1e-12);
    }

    #[test]
    fn test_responsibilities_survive_extreme_distances() {
        let m = two_component();
        // Both densities underflow in the linear domain
        let resp = m.component_responsibilities(array![80.0].view(), LOG_ZERO);
        assert!((resp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // The wide component is far more plausible out here
        assert!(resp[0] > 0.999);
    }

    #[test]
    fn test_low_weight_components_are_skipped() {
        let m = two_component();
        let resp = m.component_responsibilities(array![-1.0].view(), 0.5_f64.ln());
        assert_eq!(resp[0], 0.0);
        assert!((resp[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_split_halves_weight_and_perturbs_mean() {
        let mut m = two_component();
        let new_index = m.split_gaussian_with_largest_weight(0.2).unwrap();

        assert_eq!(m.len(), 3);
        assert_eq!(new_index, 2);
        assert!((m.components[1].weight - 0.375).abs() < 1e-12);
        assert!((m.components[2].weight - 0.375).abs() < 1e-12);
        assert!((m.total_weight() - 1.0).abs() < 1e-12);

        let expected = 2.0 + 0.2 * 0.5_f64.sqrt();
        assert!((m.components[2].gaussian.mean[0] - expected).abs() < 1e-12);
        assert_eq!(m.components[1].gaussian.mean[0], 2.0);
    }

    #[test]
    fn test_discard_negligible_components() {
        let mut m = two_component();
        m.components[0].weight = 1e-9;
        m.components[1].weight = 1.0 - 1e-9;

        let removed = m.discard_negligible_components(1e-5_f64.ln());
        assert_eq!(removed, 1);
        assert_eq!(m.len(), 1);
        assert!((m.total_weight() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_discard_keeps_heaviest_component() {
        let mut m = two_component();
        let removed = m.discard_negligible_components(0.0);
        assert_eq!(removed, 1);
        assert_eq!(m.components[0].gaussian.mean[0], 2.0);
        assert_eq!(m.components[0].weight, 1.0);
    }

    #[test]
    fn test_num_parameters() {
        let m = Mixture::single(Gaussian::isotropic(3, 1.0));
        assert_eq!(m.num_parameters(), 7);
        assert_eq!(two_component().num_parameters(), 6);
    }

    #[test]
    fn test_new_rejects_mixed_dimensions() {
        let result = Mixture::new(vec![
            Component::new(0.5, Gaussian::isotropic(1, 1.0)),
            Component::new(0.5, Gaussian::isotropic(2, 1.0)),
        ]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_mixture_roundtrips_through_json() {
        let m = two_component();
        let json = serde_json::to_string(&m).unwrap();
        let back: Mixture = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
