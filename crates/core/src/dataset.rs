//! In-memory labeled dataset

use ndarray::{Array2, ArrayView1};

use crate::{Error, LabeledDataset, Result};

/// Dense feature matrix (one row per example) with a label per row
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    features: Array2<f64>,
    labels: Vec<usize>,
    num_classes: usize,
}

impl InMemoryDataset {
    /// Create a dataset, checking row count and label range
    pub fn new(features: Array2<f64>, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::DimensionMismatch {
                expected: features.nrows(),
                found: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(Error::InvalidLabel { label, num_classes });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidModel(
                "dataset contains non-finite feature values".to_string(),
            ));
        }
        Ok(Self {
            features,
            labels,
            num_classes,
        })
    }

    /// Build from row vectors; all rows must share one length
    pub fn from_rows(rows: &[Vec<f64>], labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        let mut flat = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    found: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let features = Array2::from_shape_vec((rows.len(), dimension), flat)
            .map_err(|e| Error::InvalidModel(e.to_string()))?;
        Self::new(features, labels, num_classes)
    }

    /// Feature matrix
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Label per row
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl LabeledDataset for InMemoryDataset {
    fn num_examples(&self) -> usize {
        self.labels.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn feature_dimension(&self) -> usize {
        self.features.ncols()
    }

    fn example(&self, index: usize) -> (ArrayView1<'_, f64>, usize) {
        (self.features.row(index), self.labels[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let dataset =
            InMemoryDataset::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], vec![0, 1], 2).unwrap();
        assert_eq!(dataset.num_examples(), 2);
        assert_eq!(dataset.feature_dimension(), 2);

        let (x, label) = dataset.example(1);
        assert_eq!(label, 1);
        assert_eq!(x[0], 3.0);
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        let result = InMemoryDataset::from_rows(&[vec![1.0]], vec![3], 2);
        assert_eq!(
            result.unwrap_err(),
            Error::InvalidLabel {
                label: 3,
                num_classes: 2
            }
        );
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = InMemoryDataset::from_rows(&[vec![1.0], vec![1.0, 2.0]], vec![0, 0], 1);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_class_counts_include_empty_classes() {
        let dataset =
            InMemoryDataset::from_rows(&[vec![0.0], vec![1.0], vec![2.0]], vec![0, 2, 2], 3)
                .unwrap();
        assert_eq!(dataset.class_counts(), vec![1, 0, 2]);
    }
}
