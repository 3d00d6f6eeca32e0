//! Property-based tests for partitioning and standardization.

use ndarray::{Array1, Array2, Axis};
use proptest::prelude::*;
use slopefos_ml::StandardScaler;
use slopefos_ml::data::{FeatureColumn, FeatureMatrix, train_test_split};
use std::collections::HashSet;

fn matrix(rows: &[[f64; 4]]) -> FeatureMatrix {
    let values = Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j]);
    FeatureMatrix::new(FeatureColumn::columns(true), values).unwrap()
}

fn row_strategy() -> impl Strategy<Value = [f64; 4]> {
    (0.0..100.0f64, 0.0..45.0f64, 15.0..25.0f64, 0.0..1.0f64)
        .prop_map(|(c, p, g, r)| [c, p, g, r])
}

// --- Split properties ---

proptest! {
    #[test]
    fn split_partitions_every_row_once(
        n in 5usize..200,
        fraction in 0.05f64..0.5,
        seed in any::<u64>(),
    ) {
        let x = matrix(&vec![[1.0, 2.0, 3.0, 0.5]; n]);
        let y = Array1::from_iter((0..n).map(|i| i as f64));
        let n_test = (n as f64 * fraction).round() as usize;
        prop_assume!(n_test > 0 && n_test < n);

        let split = train_test_split(&x, &y, fraction, seed).unwrap();
        prop_assert_eq!(split.test_indices.len(), n_test);
        prop_assert_eq!(split.train_indices.len() + split.test_indices.len(), n);

        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let test: HashSet<usize> = split.test_indices.iter().copied().collect();
        prop_assert!(train.is_disjoint(&test));
        prop_assert_eq!(train.len() + test.len(), n);

        // targets follow their rows
        for (k, &i) in split.test_indices.iter().enumerate() {
            prop_assert_eq!(split.y_test[k], i as f64);
        }
    }

    #[test]
    fn split_is_deterministic_per_seed(
        n in 10usize..100,
        seed in any::<u64>(),
    ) {
        let x = matrix(&vec![[0.0; 4]; n]);
        let y = Array1::zeros(n);
        let a = train_test_split(&x, &y, 0.2, seed).unwrap();
        let b = train_test_split(&x, &y, 0.2, seed).unwrap();
        prop_assert_eq!(a.test_indices, b.test_indices);
        prop_assert_eq!(a.train_indices, b.train_indices);
    }
}

// --- Scaling properties ---

proptest! {
    #[test]
    fn scaled_training_columns_are_standardized(
        rows in prop::collection::vec(row_strategy(), 10..80),
    ) {
        let x = matrix(&rows);
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();

        for (j, column) in scaled.axis_iter(Axis(1)).enumerate() {
            let mean = column.mean().unwrap();
            prop_assert!(mean.abs() < 1e-9, "column {} mean {}", j, mean);
            if scaler.stds()[j] > 1e-6 {
                let std = column.std(0.0);
                prop_assert!((std - 1.0).abs() < 1e-9, "column {} std {}", j, std);
            }
        }
    }

    #[test]
    fn scaler_fitted_on_train_only(
        rows in prop::collection::vec(row_strategy(), 20..80),
        seed in any::<u64>(),
    ) {
        let x = matrix(&rows);
        let y = Array1::zeros(rows.len());
        let split = train_test_split(&x, &y, 0.25, seed).unwrap();
        let scaler = StandardScaler::fit(&split.x_train).unwrap();

        let train_means = split.x_train.values().mean_axis(Axis(0)).unwrap();
        for (j, &m) in scaler.means().iter().enumerate() {
            prop_assert!((m - train_means[j]).abs() < 1e-9);
        }
        // test rows go through the same affine map
        let scaled_test = scaler.transform(&split.x_test).unwrap();
        for (i, row) in split.x_test.values().rows().into_iter().enumerate() {
            let expected = scaler.transform_row(&row.to_vec()).unwrap();
            for j in 0..4 {
                prop_assert_eq!(scaled_test[[i, j]], expected[j]);
            }
        }
    }
}
