//! Per-class partition of a labeled dataset
//!
//! Every training stage walks examples class by class, so the dataset is
//! copied once into one dense matrix per class.

use gaussmix_core::{Error, Gaussian, LabeledDataset};
use gaussmix_config::constants::model::MIN_CLASS_PRIOR;
use ndarray::{Array2, ArrayView2};

use crate::Result;

/// One feature matrix per class (rows are examples)
#[derive(Debug, Clone)]
pub struct ClassData {
    classes: Vec<Array2<f64>>,
    dimension: usize,
}

impl ClassData {
    /// Partition `dataset` by label
    pub fn from_dataset<D: LabeledDataset + ?Sized>(dataset: &D) -> Result<Self> {
        let num_classes = dataset.num_classes();
        let dimension = dataset.feature_dimension();
        if dataset.num_examples() == 0 || num_classes == 0 {
            return Err(Error::EmptyDataset.into());
        }
        if dimension == 0 {
            return Err(Error::InvalidModel("feature dimension is 0".to_string()).into());
        }

        let mut flat: Vec<Vec<f64>> = vec![Vec::new(); num_classes];
        for index in 0..dataset.num_examples() {
            let (x, label) = dataset.example(index);
            if label >= num_classes {
                return Err(Error::InvalidLabel { label, num_classes }.into());
            }
            if x.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    found: x.len(),
                }
                .into());
            }
            flat[label].extend(x.iter().copied());
        }

        let classes = flat
            .into_iter()
            .map(|values| {
                let rows = values.len() / dimension;
                Array2::from_shape_vec((rows, dimension), values)
                    .map_err(|e| Error::InvalidModel(e.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { classes, dimension })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Examples of one class
    pub fn class(&self, class: usize) -> ArrayView2<'_, f64> {
        self.classes[class].view()
    }

    pub fn classes(&self) -> &[Array2<f64>] {
        &self.classes
    }

    /// Example count per class
    pub fn counts(&self) -> Vec<usize> {
        self.classes.iter().map(Array2::nrows).collect()
    }

    /// Total example count
    pub fn total(&self) -> usize {
        self.classes.iter().map(Array2::nrows).sum()
    }

    /// `n_c / N`, with a small positive floor for classes without examples
    pub fn priors(&self) -> Vec<f64> {
        let total = self.total() as f64;
        self.classes
            .iter()
            .map(|rows| {
                if rows.nrows() == 0 {
                    MIN_CLASS_PRIOR
                } else {
                    rows.nrows() as f64 / total
                }
            })
            .collect()
    }

    /// Single Gaussian fitted to all examples regardless of label
    pub fn pooled_gaussian(&self, covariance_floor: f64) -> Option<Gaussian> {
        let views: Vec<ArrayView2<'_, f64>> = self
            .classes
            .iter()
            .filter(|rows| rows.nrows() > 0)
            .map(Array2::view)
            .collect();
        let pooled = ndarray::concatenate(ndarray::Axis(0), &views).ok()?;
        Gaussian::from_samples(pooled.view(), covariance_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaussmix_core::InMemoryDataset;

    fn dataset() -> InMemoryDataset {
        InMemoryDataset::from_rows(
            &[vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]],
            vec![1, 0, 1],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_partition_by_label() {
        let data = ClassData::from_dataset(&dataset()).unwrap();
        assert_eq!(data.counts(), vec![1, 2, 0]);
        assert_eq!(data.class(1)[[1, 0]], 4.0);
        assert_eq!(data.class(2).nrows(), 0);
        assert_eq!(data.class(2).ncols(), 2);
    }

    #[test]
    fn test_priors_floor_empty_class() {
        let data = ClassData::from_dataset(&dataset()).unwrap();
        let priors = data.priors();
        assert!((priors[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((priors[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(priors[2], MIN_CLASS_PRIOR);
    }

    #[test]
    fn test_pooled_gaussian() {
        let data = ClassData::from_dataset(&dataset()).unwrap();
        let g = data.pooled_gaussian(1e-6).unwrap();
        assert!((g.mean[0] - 2.0).abs() < 1e-12);
        assert!((g.mean[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_empty_dataset() {
        let empty = InMemoryDataset::from_rows(&[], vec![], 2).unwrap();
        assert!(ClassData::from_dataset(&empty).is_err());
    }
}
