//! Core types for per-class Gaussian mixture models
//!
//! This crate provides foundational types used across all other crates:
//! - Diagonal-covariance Gaussian densities
//! - Weighted mixtures with log-domain likelihoods and responsibilities
//! - The labeled dataset seam (`LabeledDataset`) plus an in-memory implementation
//! - The trained classifier (per-class log-likelihoods and posteriors)
//! - Error types

pub mod classifier;
pub mod dataset;
pub mod error;
pub mod gaussian;
pub mod mixture;
pub mod numeric;
pub mod traits;

pub use classifier::GaussianMixtureClassifier;
pub use dataset::InMemoryDataset;
pub use error::{Error, Result};
pub use gaussian::Gaussian;
pub use mixture::{Component, Mixture};
pub use numeric::{log_sum_exp, LOG_ZERO};
pub use traits::LabeledDataset;
