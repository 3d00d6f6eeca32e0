//! Gradient-boosted regression trees.
//!
//! One additive model covers the three boosting entries of the roster; they
//! differ only in how trees are grown and regularized:
//!
//! - least-squares gradient boosting: first-order leaves, per-split feature
//!   sampling, row subsampling without replacement;
//! - XGBoost-style: depth-wise trees with L1/L2 leaf regularization, a
//!   minimum split gain, and per-tree column sampling;
//! - LightGBM-style: leaf-wise trees bounded by a leaf budget and a minimum
//!   number of rows per leaf.

use super::tree::{GradientTarget, Growth, RegressionTree, TreeParams};
use super::{Regressor, check_features, check_training_data};
use crate::error::MlError;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use slopefos_core::config::{GbParams, LgbmParams, XgbParams};

/// Parameters of one boosting run.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn (without replacement) for each tree.
    pub subsample: f64,
    /// Fraction of features available to each tree.
    pub colsample_bytree: f64,
    pub tree: TreeParams,
    pub seed: u64,
}

impl BoostingParams {
    pub fn gradient_boosting(p: &GbParams, n_features: usize) -> Self {
        Self {
            n_rounds: p.n_estimators,
            learning_rate: p.learning_rate,
            subsample: p.subsample,
            colsample_bytree: 1.0,
            tree: TreeParams {
                max_depth: Some(p.max_depth),
                min_samples_split: p.min_samples_split,
                min_samples_leaf: p.min_samples_leaf,
                max_features: Some(p.max_features.resolve(n_features)),
                ..TreeParams::default()
            },
            seed: p.seed,
        }
    }

    pub fn xgboost(p: &XgbParams) -> Self {
        Self {
            n_rounds: p.n_estimators,
            learning_rate: p.learning_rate,
            subsample: p.subsample,
            colsample_bytree: p.colsample_bytree,
            tree: TreeParams {
                max_depth: Some(p.max_depth),
                min_child_weight: p.min_child_weight,
                reg_lambda: p.reg_lambda,
                reg_alpha: p.reg_alpha,
                gamma: p.gamma,
                ..TreeParams::default()
            },
            seed: p.seed,
        }
    }

    pub fn lightgbm(p: &LgbmParams) -> Self {
        Self {
            n_rounds: p.n_estimators,
            learning_rate: p.learning_rate,
            subsample: p.subsample,
            colsample_bytree: p.colsample_bytree,
            tree: TreeParams {
                max_depth: p.max_depth,
                min_samples_leaf: p.min_child_samples,
                min_child_weight: p.min_child_weight,
                reg_lambda: p.reg_lambda,
                growth: Growth::LeafWise {
                    max_leaves: p.num_leaves,
                },
                ..TreeParams::default()
            },
            seed: p.seed,
        }
    }

    fn validate(&self) -> Result<(), MlError> {
        if self.n_rounds == 0 {
            return Err(MlError::training("boosting needs at least one round"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MlError::training(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(MlError::training(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.tree.max_depth == Some(0) {
            return Err(MlError::training("max_depth must be positive"));
        }
        if self.tree.reg_lambda < 0.0 || self.tree.reg_alpha < 0.0 {
            return Err(MlError::training("regularization must be non-negative"));
        }
        if let Growth::LeafWise { max_leaves } = self.tree.growth {
            if max_leaves < 2 {
                return Err(MlError::training("num_leaves must be at least 2"));
            }
        }
        Ok(())
    }
}

/// An additive ensemble: `base_score + learning_rate * sum(tree(x))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    n_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &BoostingParams) -> Result<Self, MlError> {
        check_training_data(x, y)?;
        params.validate()?;

        let n = x.nrows();
        let n_features = x.ncols();
        let base_score = y.mean().unwrap_or(0.0);
        let mut predictions = vec![base_score; n];
        let hess = vec![1.0; n];
        let mut grad = vec![0.0; n];

        let n_rows = ((params.subsample * n as f64).floor() as usize).clamp(1, n);
        let n_cols = ((params.colsample_bytree * n_features as f64).floor() as usize)
            .clamp(1, n_features);
        let all_rows: Vec<usize> = (0..n).collect();
        let all_features: Vec<usize> = (0..n_features).collect();

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_rounds);
        for _ in 0..params.n_rounds {
            for (i, g) in grad.iter_mut().enumerate() {
                *g = predictions[i] - y[i];
            }
            let rows = sample_sorted(&all_rows, n_rows, &mut rng);
            let features = sample_sorted(&all_features, n_cols, &mut rng);
            let target = GradientTarget {
                grad: &grad,
                hess: &hess,
            };
            let tree = RegressionTree::fit(x, &target, &rows, &features, &params.tree, &mut rng);
            for (i, p) in predictions.iter_mut().enumerate() {
                *p += params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(MlError::training("boosting produced non-finite predictions"));
        }
        Ok(Self {
            n_features,
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// `k` distinct items in ascending order; all items when `k` covers them.
fn sample_sorted(items: &[usize], k: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if k >= items.len() {
        return items.to_vec();
    }
    let mut chosen: Vec<usize> = items.choose_multiple(rng, k).copied().collect();
    chosen.sort_unstable();
    chosen
}

impl Regressor for BoostedTrees {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        check_features(self.n_features, x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                self.base_score + self.learning_rate * sum
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::RegressionMetrics;
    use slopefos_core::config::MaxFeatures;

    fn smooth_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 4), |(i, j)| ((i * (j + 3) + j) % 29) as f64 / 29.0);
        let y = x
            .rows()
            .into_iter()
            .map(|r| 0.8 + r[0] + 0.6 * r[1] - 0.3 * r[2] + 0.1 * r[3])
            .collect();
        (x, y)
    }

    fn r2(model: &BoostedTrees, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        let predictions = model.predict(x).unwrap();
        RegressionMetrics::compute(y, &predictions).unwrap().r2
    }

    #[test]
    fn test_gradient_boosting_fits() {
        let (x, y) = smooth_problem(120);
        let params = GbParams {
            n_estimators: 150,
            learning_rate: 0.1,
            ..GbParams::default()
        };
        let model =
            BoostedTrees::fit(&x, &y, &BoostingParams::gradient_boosting(&params, 4)).unwrap();
        assert_eq!(model.n_trees(), 150);
        assert!(r2(&model, &x, &y) > 0.9);
    }

    #[test]
    fn test_xgboost_fits() {
        let (x, y) = smooth_problem(120);
        let params = XgbParams {
            n_estimators: 150,
            learning_rate: 0.1,
            ..XgbParams::default()
        };
        let model = BoostedTrees::fit(&x, &y, &BoostingParams::xgboost(&params)).unwrap();
        assert!(r2(&model, &x, &y) > 0.85);
    }

    #[test]
    fn test_lightgbm_fits() {
        let (x, y) = smooth_problem(200);
        let params = LgbmParams {
            n_estimators: 100,
            ..LgbmParams::default()
        };
        let model = BoostedTrees::fit(&x, &y, &BoostingParams::lightgbm(&params)).unwrap();
        assert!(r2(&model, &x, &y) > 0.85);
    }

    #[test]
    fn test_gradient_boosting_resolves_sqrt_features() {
        let params = BoostingParams::gradient_boosting(&GbParams::default(), 4);
        assert_eq!(params.tree.max_features, Some(2));
        let all = GbParams {
            max_features: MaxFeatures::All,
            ..GbParams::default()
        };
        assert_eq!(
            BoostingParams::gradient_boosting(&all, 3).tree.max_features,
            Some(3)
        );
    }

    #[test]
    fn test_boosting_is_deterministic_for_a_seed() {
        let (x, y) = smooth_problem(60);
        let params = BoostingParams::xgboost(&XgbParams {
            n_estimators: 20,
            ..XgbParams::default()
        });
        let a = BoostedTrees::fit(&x, &y, &params).unwrap();
        let b = BoostedTrees::fit(&x, &y, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_hyperparameters_are_rejected() {
        let (x, y) = smooth_problem(20);
        let mut params = BoostingParams::xgboost(&XgbParams::default());
        params.learning_rate = 0.0;
        assert!(BoostedTrees::fit(&x, &y, &params).is_err());

        let mut params = BoostingParams::xgboost(&XgbParams::default());
        params.subsample = 1.5;
        assert!(BoostedTrees::fit(&x, &y, &params).is_err());

        let params = BoostingParams::lightgbm(&LgbmParams {
            num_leaves: 1,
            ..LgbmParams::default()
        });
        assert!(BoostedTrees::fit(&x, &y, &params).is_err());
    }
}
