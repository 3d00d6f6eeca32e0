//! Random forest regression: bagged least-squares trees.

use super::tree::{GradientTarget, RegressionTree, TreeParams};
use super::{Regressor, check_features, check_training_data};
use crate::error::MlError;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use slopefos_core::config::ForestParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &ForestParams) -> Result<Self, MlError> {
        check_training_data(x, y)?;
        if params.n_estimators == 0 {
            return Err(MlError::training("random forest needs at least one tree"));
        }
        if params.max_depth == Some(0) {
            return Err(MlError::training("random forest max_depth must be positive"));
        }

        let n = x.nrows();
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; n];
        let target = GradientTarget {
            grad: &grad,
            hess: &hess,
        };
        let features: Vec<usize> = (0..x.ncols()).collect();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            ..TreeParams::default()
        };

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let all_rows: Vec<usize> = (0..n).collect();
        let trees = (0..params.n_estimators)
            .map(|_| {
                let rows: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    all_rows.clone()
                };
                RegressionTree::fit(x, &target, &rows, &features, &tree_params, &mut rng)
            })
            .collect();

        Ok(Self {
            n_features: x.ncols(),
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        check_features(self.n_features, x)?;
        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::RegressionMetrics;

    fn smooth_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| ((i * (j + 2)) % 23) as f64 / 23.0);
        let y = x.rows().into_iter().map(|r| 1.0 + r[0] + 0.5 * r[1]).collect();
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_forest_fits_training_data() {
        let (x, y) = smooth_problem(80);
        let forest = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(forest.n_trees(), 20);
        let predictions = forest.predict(&x).unwrap();
        let metrics = RegressionMetrics::compute(&y, &predictions).unwrap();
        assert!(metrics.r2 > 0.9, "r2 = {}", metrics.r2);
    }

    #[test]
    fn test_forest_is_deterministic_for_a_seed() {
        let (x, y) = smooth_problem(40);
        let a = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        let b = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_forest_rejects_zero_trees() {
        let (x, y) = smooth_problem(10);
        let params = ForestParams {
            n_estimators: 0,
            ..ForestParams::default()
        };
        assert!(RandomForestRegressor::fit(&x, &y, &params).is_err());
    }

    #[test]
    fn test_forest_checks_feature_count() {
        let (x, y) = smooth_problem(10);
        let forest = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert!(forest.predict(&Array2::zeros((1, 3))).is_err());
    }
}
