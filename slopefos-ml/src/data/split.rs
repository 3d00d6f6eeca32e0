//! Seeded train/test partitioning.

use super::dataset::FeatureMatrix;
use crate::error::MlError;
use ndarray::{Array1, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Both sides of a partition, with the original row indices of each.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: FeatureMatrix,
    pub x_test: FeatureMatrix,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Partition rows into train and test sets.
///
/// The rows are permuted with a ChaCha8 generator seeded by `seed`; the first
/// `round(n * test_fraction)` permuted rows are the test set. The same inputs
/// always produce the same partition.
pub fn train_test_split(
    x: &FeatureMatrix,
    y: &Array1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, MlError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(MlError::invalid_input(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let n = x.n_rows();
    if n != y.len() {
        return Err(MlError::shape(format!(
            "feature matrix has {n} rows but target has {}",
            y.len()
        )));
    }
    let n_test = (n as f64 * test_fraction).round() as usize;
    if n_test == 0 || n_test >= n {
        return Err(MlError::dataset(format!(
            "{n} rows cannot be split with test fraction {test_fraction}"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let (test, train) = order.split_at(n_test);

    Ok(TrainTestSplit {
        x_train: x.select_rows(train),
        x_test: x.select_rows(test),
        y_train: y.select(Axis(0), train),
        y_test: y.select(Axis(0), test),
        train_indices: train.to_vec(),
        test_indices: test.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::FeatureColumn;
    use ndarray::Array2;

    fn matrix(n: usize) -> (FeatureMatrix, Array1<f64>) {
        let values = Array2::from_shape_fn((n, 3), |(i, j)| (i * 3 + j) as f64);
        let x = FeatureMatrix::new(FeatureColumn::columns(false), values).unwrap();
        let y = (0..n).map(|i| i as f64).collect();
        (x, y)
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (x, y) = matrix(10);
        let split = train_test_split(&x, &y, 0.2, 42).unwrap();
        assert_eq!(split.test_indices.len(), 2);
        assert_eq!(split.train_indices.len(), 8);

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(&split.test_indices)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_rows_follow_their_indices() {
        let (x, y) = matrix(12);
        let split = train_test_split(&x, &y, 0.25, 7).unwrap();
        for (k, &i) in split.test_indices.iter().enumerate() {
            assert_eq!(split.y_test[k], i as f64);
            assert_eq!(split.x_test.values()[[k, 0]], (i * 3) as f64);
        }
        assert_eq!(split.x_train.columns(), x.columns());
    }

    #[test]
    fn test_same_seed_same_partition() {
        let (x, y) = matrix(50);
        let a = train_test_split(&x, &y, 0.2, 42).unwrap();
        let b = train_test_split(&x, &y, 0.2, 42).unwrap();
        let c = train_test_split(&x, &y, 0.2, 43).unwrap();
        assert_eq!(a.test_indices, b.test_indices);
        assert_eq!(a.train_indices, b.train_indices);
        assert_ne!(a.test_indices, c.test_indices);
    }

    #[test]
    fn test_split_rejects_bad_inputs() {
        let (x, y) = matrix(10);
        assert!(train_test_split(&x, &y, 0.0, 42).is_err());
        assert!(train_test_split(&x, &y, 1.0, 42).is_err());
        let (x1, y1) = matrix(1);
        assert!(train_test_split(&x1, &y1, 0.2, 42).is_err());
        let short: Array1<f64> = Array1::zeros(4);
        assert!(matches!(
            train_test_split(&x, &short, 0.2, 42),
            Err(MlError::ShapeMismatch(_))
        ));
    }
}
