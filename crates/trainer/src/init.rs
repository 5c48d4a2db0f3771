//! Mixture initializers
//!
//! The up-mix path starts from [`single_gaussian`] and grows by splitting.
//! [`KMeansInitializer`] places all components at once: k-means++ seeding
//! from a fixed-seed RNG followed by Lloyd iterations, so a given seed
//! always yields the same mixture.

use gaussmix_config::constants::kmeans;
use gaussmix_core::{Component, Gaussian, Mixture};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Result, TrainerError};

/// Produces a starting mixture with a given number of components
pub trait Initializer: Send + Sync {
    fn initialize(
        &self,
        data: ArrayView2<'_, f64>,
        num_components: usize,
        covariance_floor: f64,
    ) -> Result<Mixture>;
}

/// One Gaussian fitted to all of `data`
pub fn single_gaussian(data: ArrayView2<'_, f64>, covariance_floor: f64) -> Result<Mixture> {
    Gaussian::from_samples(data, covariance_floor)
        .map(Mixture::single)
        .ok_or_else(|| TrainerError::Initialization("cannot fit a Gaussian to zero examples".to_string()))
}

/// k-means++ seeded Lloyd clustering
#[derive(Debug, Clone)]
pub struct KMeansInitializer {
    pub seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for KMeansInitializer {
    fn default() -> Self {
        Self::with_seed(kmeans::SEED)
    }
}

impl KMeansInitializer {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            max_iterations: kmeans::MAX_ITERATIONS,
            tolerance: kmeans::TOLERANCE,
        }
    }

    fn seed_centroids(&self, data: ArrayView2<'_, f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((k, data.ncols()));
        centroids.row_mut(0).assign(&data.row(rng.gen_range(0..n)));

        let mut nearest: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|x| squared_distance(x, centroids.row(0)))
            .collect();

        for c in 1..k {
            let total: f64 = nearest.iter().sum();
            let chosen = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut pick = n - 1;
                for (i, &d) in nearest.iter().enumerate() {
                    if target < d {
                        pick = i;
                        break;
                    }
                    target -= d;
                }
                pick
            } else {
                // All remaining points coincide with existing centroids
                rng.gen_range(0..n)
            };
            centroids.row_mut(c).assign(&data.row(chosen));

            for (d, x) in nearest.iter_mut().zip(data.rows()) {
                *d = d.min(squared_distance(x, centroids.row(c)));
            }
        }
        centroids
    }

    /// Cluster `data` into `k` groups; returns centroids and assignments
    pub fn cluster(&self, data: ArrayView2<'_, f64>, k: usize) -> Result<(Array2<f64>, Vec<usize>)> {
        let n = data.nrows();
        if k == 0 || k > n {
            return Err(TrainerError::Initialization(format!(
                "cannot form {} clusters from {} examples",
                k, n
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.seed_centroids(data, k, &mut rng);
        let mut assignments = vec![0usize; n];

        for iteration in 0..self.max_iterations {
            for (slot, x) in assignments.iter_mut().zip(data.rows()) {
                *slot = nearest_centroid(x, centroids.view());
            }

            let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
            let mut counts = vec![0usize; k];
            for (&cluster, x) in assignments.iter().zip(data.rows()) {
                sums.row_mut(cluster).scaled_add(1.0, &x);
                counts[cluster] += 1;
            }

            let mut max_shift: f64 = 0.0;
            for (cluster, &count) in counts.iter().enumerate() {
                // Empty clusters keep their previous centroid
                if count == 0 {
                    continue;
                }
                let updated = &sums.row(cluster) / count as f64;
                max_shift = max_shift.max(squared_distance(updated.view(), centroids.row(cluster)));
                centroids.row_mut(cluster).assign(&updated);
            }

            if max_shift < self.tolerance {
                tracing::trace!(iteration, "k-means converged");
                break;
            }
        }

        Ok((centroids, assignments))
    }
}

impl Initializer for KMeansInitializer {
    fn initialize(
        &self,
        data: ArrayView2<'_, f64>,
        num_components: usize,
        covariance_floor: f64,
    ) -> Result<Mixture> {
        let (centroids, assignments) = self.cluster(data, num_components)?;

        let mut global_variance = data.var_axis(Axis(0), 0.0);
        global_variance.mapv_inplace(|v| v.max(covariance_floor));

        let mut components = Vec::with_capacity(num_components);
        for (cluster, centroid) in centroids.rows().into_iter().enumerate() {
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, a)| **a == cluster)
                .map(|(i, _)| i)
                .collect();

            // Clusters too small for a variance estimate borrow the global one
            let variance: Array1<f64> = if members.len() >= 2 {
                let rows = data.select(Axis(0), &members);
                let mut v = rows.var_axis(Axis(0), 0.0);
                v.mapv_inplace(|x| x.max(covariance_floor));
                v
            } else {
                global_variance.clone()
            };

            let gaussian = Gaussian {
                mean: centroid.to_owned(),
                variance,
            };
            components.push(Component::new(members.len().max(1) as f64, gaussian));
        }

        let mut mixture = Mixture::new(components)?;
        mixture.normalize_weights();
        Ok(mixture)
    }
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(x: ArrayView1<'_, f64>, centroids: ArrayView2<'_, f64>) -> usize {
    centroids
        .rows()
        .into_iter()
        .map(|c| squared_distance(x, c))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_clusters() -> Array2<f64> {
        let mut values = Vec::new();
        for center in [-10.0, 0.0, 10.0] {
            for i in 0..20 {
                let offset = (i as f64 - 9.5) * 0.05;
                values.push(center + offset);
                values.push(center - offset);
            }
        }
        Array2::from_shape_vec((60, 2), values).unwrap()
    }

    #[test]
    fn test_kmeans_finds_clusters() {
        let data = three_clusters();
        let init = KMeansInitializer::default();
        let mixture = init.initialize(data.view(), 3, 1e-4).unwrap();

        assert_eq!(mixture.len(), 3);
        let mut means: Vec<f64> = mixture
            .components
            .iter()
            .map(|c| c.gaussian.mean[0])
            .collect();
        means.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (found, expected) in means.iter().zip([-10.0, 0.0, 10.0]) {
            assert!((found - expected).abs() < 1e-9, "{:?}", means);
        }
        for c in &mixture.components {
            assert!((c.weight - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kmeans_is_deterministic_for_a_seed() {
        let data = three_clusters();
        let a = KMeansInitializer::with_seed(7).initialize(data.view(), 4, 1e-4).unwrap();
        let b = KMeansInitializer::with_seed(7).initialize(data.view(), 4, 1e-4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kmeans_rejects_too_many_clusters() {
        let data = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        let err = KMeansInitializer::default()
            .initialize(data.view(), 3, 1e-4)
            .unwrap_err();
        assert!(matches!(err, TrainerError::Initialization(_)));
    }

    #[test]
    fn test_duplicate_points_still_yield_requested_count() {
        let data = Array2::from_elem((5, 1), 2.0);
        let mixture = KMeansInitializer::default()
            .initialize(data.view(), 3, 1e-3)
            .unwrap();
        assert_eq!(mixture.len(), 3);
        assert!((mixture.total_weight() - 1.0).abs() < 1e-12);
        assert!(mixture
            .components
            .iter()
            .all(|c| c.gaussian.variance[0] >= 1e-3));
    }

    #[test]
    fn test_single_gaussian() {
        let data = three_clusters();
        let mixture = single_gaussian(data.view(), 1e-4).unwrap();
        assert_eq!(mixture.len(), 1);
        assert!(mixture.components[0].gaussian.mean[0].abs() < 1e-9);
        assert!(single_gaussian(Array2::<f64>::zeros((0, 2)).view(), 1e-4).is_err());
    }
}
