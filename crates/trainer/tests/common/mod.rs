//! Synthetic data shared by the integration tests

#![allow(dead_code)]

use gaussmix_core::InMemoryDataset;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// `count` rows around `center` with per-dimension std-dev `sigma`
pub fn cluster(rng: &mut StdRng, center: &[f64], sigma: f64, count: usize) -> Vec<Vec<f64>> {
    let normals: Vec<Normal<f64>> = center
        .iter()
        .map(|&c| Normal::new(c, sigma).unwrap())
        .collect();
    (0..count)
        .map(|_| normals.iter().map(|n| n.sample(rng)).collect())
        .collect()
}

/// Rows as a matrix
pub fn matrix(rows: &[Vec<f64>]) -> Array2<f64> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), dim), flat).unwrap()
}

/// Dataset from per-class row lists
pub fn dataset(classes: Vec<Vec<Vec<f64>>>) -> InMemoryDataset {
    let num_classes = classes.len();
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (label, class_rows) in classes.into_iter().enumerate() {
        labels.extend(std::iter::repeat(label).take(class_rows.len()));
        rows.extend(class_rows);
    }
    InMemoryDataset::from_rows(&rows, labels, num_classes).unwrap()
}

/// Two classes, each made of two well separated clusters in 2-D
pub fn two_cluster_classes(seed: u64) -> InMemoryDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut class0 = cluster(&mut rng, &[-6.0, 0.0], 0.6, 150);
    class0.extend(cluster(&mut rng, &[-2.0, 4.0], 0.6, 150));
    let mut class1 = cluster(&mut rng, &[6.0, 0.0], 0.6, 150);
    class1.extend(cluster(&mut rng, &[2.0, -4.0], 0.6, 150));
    dataset(vec![class0, class1])
}

/// The six-point 1-D example: class 0 near -1, class 1 near +1
pub fn toy_example() -> InMemoryDataset {
    dataset(vec![
        vec![vec![-1.0], vec![-0.9], vec![-1.1]],
        vec![vec![1.0], vec![0.9], vec![1.1]],
    ])
}
