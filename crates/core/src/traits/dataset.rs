//! Labeled dataset seam
//!
//! The training engine never owns the dataset; it reads examples through
//! this trait, copies each class's rows once, and works on those copies.

use ndarray::ArrayView1;

/// Read-only labeled feature vectors
///
/// Implementations:
/// - `InMemoryDataset` - dense `Array2` of features plus a label vector
///
/// # Example
///
/// ```ignore
/// let dataset = InMemoryDataset::new(features, labels, 2)?;
/// let (x, label) = dataset.example(0);
/// assert_eq!(x.len(), dataset.feature_dimension());
/// ```
pub trait LabeledDataset {
    /// Number of examples
    fn num_examples(&self) -> usize;

    /// Number of classes; labels lie in `0..num_classes()`
    fn num_classes(&self) -> usize;

    /// Length of every feature vector
    fn feature_dimension(&self) -> usize;

    /// Features and class label of example `index`
    ///
    /// # Panics
    /// May panic when `index >= num_examples()`.
    fn example(&self, index: usize) -> (ArrayView1<'_, f64>, usize);

    /// Number of examples carrying each label
    fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for i in 0..self.num_examples() {
            let (_, label) = self.example(i);
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }
}
