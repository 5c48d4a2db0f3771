//! Pooled "generator" mixture used as the MMIE denominator
//!
//! Every class's components are concatenated in class order, each weight
//! scaled by the class prior, so `p_gen(x) = Σ_c π_c p(x | c)`.

use gaussmix_core::{Component, Mixture};
use ndarray::ArrayView1;

/// Pooled mixture plus the map back to `(class, component)`
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorModel {
    mixture: Mixture,
    owners: Vec<(usize, usize)>,
    offsets: Vec<usize>,
}

impl GeneratorModel {
    /// Pool `mixtures` weighted by `priors` (one per class)
    pub fn build(mixtures: &[Mixture], priors: &[f64]) -> Self {
        let total: usize = mixtures.iter().map(Mixture::len).sum();
        let mut components = Vec::with_capacity(total);
        let mut owners = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(mixtures.len());

        for (class, (mixture, &prior)) in mixtures.iter().zip(priors).enumerate() {
            offsets.push(components.len());
            for (index, component) in mixture.components.iter().enumerate() {
                components.push(Component::new(
                    prior * component.weight,
                    component.gaussian.clone(),
                ));
                owners.push((class, index));
            }
        }

        Self {
            mixture: Mixture { components },
            owners,
            offsets,
        }
    }

    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    pub fn len(&self) -> usize {
        self.mixture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture.is_empty()
    }

    /// `(class, component)` owning pooled component `pooled`
    pub fn owner(&self, pooled: usize) -> Option<(usize, usize)> {
        self.owners.get(pooled).copied()
    }

    /// Pooled index of `component` within `class`
    pub fn pooled_index(&self, class: usize, component: usize) -> usize {
        self.offsets[class] + component
    }

    /// Pooled mixture with zero weight wherever the owning class component
    /// has `ln w < min_log_weight`, matching what each class's own
    /// accumulator skips
    pub fn truncated(&self, mixtures: &[Mixture], min_log_weight: f64) -> Mixture {
        let mut pooled = self.mixture.clone();
        for (component, &(class, index)) in pooled.components.iter_mut().zip(&self.owners) {
            let skipped = mixtures
                .get(class)
                .and_then(|m| m.components.get(index))
                .map_or(true, |c| c.log_weight() < min_log_weight);
            if skipped {
                component.weight = 0.0;
            }
        }
        pooled
    }

    /// `ln p_gen(x)`
    pub fn log_likelihood(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.mixture.log_likelihood(x)
    }
}
