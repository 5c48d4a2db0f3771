//! Maximum-likelihood training through the public API

mod common;

use gaussmix_config::TrainingConfig;
use gaussmix_core::{LabeledDataset, Mixture};
use gaussmix_trainer::{
    fit_class, single_gaussian, EmOptions, GmmTrainer, MixtureAccumulator, ReestimationParams,
    TrainingStrategy,
};
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

use common::{cluster, matrix, toy_example, two_cluster_classes};

#[test]
fn test_end_to_end_two_classes() {
    let model = GmmTrainer::new(TrainingConfig::with_target(1))
        .unwrap()
        .train(&toy_example())
        .unwrap();
    let classifier = &model.classifier;

    let g0 = &classifier.mixture(0).unwrap().components[0].gaussian;
    let g1 = &classifier.mixture(1).unwrap().components[0].gaussian;
    assert!((g0.mean[0] + 1.0).abs() < 0.05);
    assert!((g1.mean[0] - 1.0).abs() < 0.05);

    let floor = TrainingConfig::default().covariance_floor;
    for g in [g0, g1] {
        assert!(g.variance[0] >= floor);
        assert!((g.variance[0] - 0.02 / 3.0).abs() < 1e-3);
    }

    let posteriors = classifier.class_posteriors(array![-1.0].view()).unwrap();
    assert!(posteriors[0] > 0.99);
    assert_eq!(classifier.predict(array![0.95].view()).unwrap(), 1);
}

#[test]
fn test_em_log_likelihood_is_monotone() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut rows = cluster(&mut rng, &[0.0, 0.0], 1.0, 200);
    rows.extend(cluster(&mut rng, &[3.0, 1.0], 0.5, 100));
    rows.extend(cluster(&mut rng, &[-2.0, 4.0], 0.8, 100));
    let data = matrix(&rows);

    let mut mixture = single_gaussian(data.view(), 1e-4).unwrap();
    mixture.split_gaussian_with_largest_weight(0.2).unwrap();
    mixture.split_gaussian_with_largest_weight(0.2).unwrap();

    let outcome = fit_class(&mut mixture, data.view(), &EmOptions::default(), 0).unwrap();
    for pair in outcome.history.windows(2) {
        assert!(
            pair[1] >= pair[0] - 1e-6 * pair[0].abs(),
            "log-likelihood dropped: {:?}",
            pair
        );
    }
}

#[test]
fn test_weights_normalized_after_every_m_step() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut rows = cluster(&mut rng, &[0.0], 1.0, 120);
    rows.extend(cluster(&mut rng, &[5.0], 1.0, 80));
    let data = matrix(&rows);

    let mut mixture = single_gaussian(data.view(), 1e-4).unwrap();
    for _ in 0..3 {
        mixture.split_gaussian_with_largest_weight(0.2).unwrap();
    }
    let params = ReestimationParams::default();
    let mut accumulator = MixtureAccumulator::new(&mixture, params.min_log_weight);
    for _ in 0..10 {
        accumulator.reset();
        accumulator.accumulate_rows(&mixture, data.view());
        accumulator.reestimate(&mut mixture, &params, 0).unwrap();
        assert!((mixture.total_weight() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_variance_floor_holds_everywhere() {
    let mut rng = StdRng::seed_from_u64(9);
    // Second dimension is constant, so its variance must sit exactly at the floor
    let rows: Vec<Vec<f64>> = cluster(&mut rng, &[0.0], 1.0, 60)
        .into_iter()
        .map(|r| vec![r[0], 2.0])
        .collect();
    let dataset = common::dataset(vec![rows]);

    let mut config = TrainingConfig::with_target(3);
    config.covariance_floor = 0.01;
    let model = GmmTrainer::new(config).unwrap().train(&dataset).unwrap();

    for mixture in model.classifier.mixtures() {
        for c in &mixture.components {
            assert!(c.gaussian.variance.iter().all(|&v| v >= 0.01));
            assert_eq!(c.gaussian.variance[1], 0.01);
        }
    }
}

#[test]
fn test_up_mix_target_one_never_splits() {
    let dataset = two_cluster_classes(1);
    let model = GmmTrainer::new(TrainingConfig::with_target(1))
        .unwrap()
        .train(&dataset)
        .unwrap();
    assert_eq!(model.report.strategy, TrainingStrategy::Mle);
    for class in &model.report.classes {
        assert_eq!(class.em_runs, 1);
        assert_eq!(class.splits, 0);
        assert_eq!(class.num_components, 1);
    }
}

#[test]
fn test_bic_selects_two_components_per_class() {
    let dataset = two_cluster_classes(17);
    let mut config = TrainingConfig::default();
    config.lambda_for_bic = Some(1.0);
    let model = GmmTrainer::new(config).unwrap().train(&dataset).unwrap();

    for (class, mixture) in model.classifier.mixtures().iter().enumerate() {
        assert_eq!(mixture.len(), 2, "class {}", class);
        assert!(model.report.classes[class].bic.is_some());
    }
}

#[test]
fn test_degenerate_class_is_capped_not_rejected() {
    let dataset = common::dataset(vec![
        vec![vec![0.0], vec![0.5]],
        vec![vec![5.0], vec![5.5], vec![6.0], vec![6.5], vec![7.0]],
    ]);
    let model = GmmTrainer::new(TrainingConfig::with_target(4))
        .unwrap()
        .train(&dataset)
        .unwrap();
    assert!(model.classifier.mixture(0).unwrap().len() <= 2);
    assert_eq!(dataset.num_examples(), 7);
}

#[test]
fn test_classifier_roundtrips_through_json() {
    let model = GmmTrainer::new(TrainingConfig::with_target(1))
        .unwrap()
        .train(&toy_example())
        .unwrap();
    let json = serde_json::to_string(&model.classifier).unwrap();
    let back: gaussmix_core::GaussianMixtureClassifier = serde_json::from_str(&json).unwrap();
    assert_eq!(back, model.classifier);
    let _: &[Mixture] = back.mixtures();
}
