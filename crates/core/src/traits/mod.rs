//! Core traits for the mixture training system
//!
//! Collaborators outside the training engine plug in through these traits:
//!
//! ```text
//! Data:
//!   - LabeledDataset: read-only feature vectors with integer class labels
//! ```

mod dataset;

pub use dataset::LabeledDataset;
