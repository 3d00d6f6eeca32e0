//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! Fitting is delegated to `linfa-svm` (SMO solver); the fitted model is kept
//! whole so it serializes with the rest of the artifact set.

use super::{Regressor, check_features, check_training_data};
use crate::error::MlError;
use linfa::Dataset;
use linfa::traits::{Fit, Predict};
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use slopefos_core::config::SvmParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorRegressor {
    gamma: f64,
    n_features: usize,
    svm: Svm<f64, f64>,
}

/// `1 / (n_features * Var(X))` over every element of `x`.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let var = x.var(0.0);
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

impl SupportVectorRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &SvmParams) -> Result<Self, MlError> {
        check_training_data(x, y)?;
        if !(params.c > 0.0 && params.c.is_finite()) {
            return Err(MlError::training(format!("C must be positive, got {}", params.c)));
        }
        if !(params.epsilon >= 0.0) {
            return Err(MlError::training(format!(
                "epsilon must be non-negative, got {}",
                params.epsilon
            )));
        }
        if !(params.tol > 0.0) {
            return Err(MlError::training(format!("tol must be positive, got {}", params.tol)));
        }
        let gamma = match params.gamma {
            Some(g) if g > 0.0 => g,
            Some(g) => return Err(MlError::training(format!("gamma must be positive, got {g}"))),
            None => scale_gamma(x),
        };

        let dataset = Dataset::new(x.clone(), y.clone());
        // linfa's gaussian kernel is exp(-|a - b|^2 / eps)
        let svm = Svm::<f64, f64>::params()
            .c_svr(params.c, Some(params.epsilon))
            .gaussian_kernel(1.0 / gamma)
            .eps(params.tol)
            .shrinking(params.shrinking)
            .fit(&dataset)
            .map_err(|e| MlError::training(format!("SVR fit failed: {e}")))?;
        tracing::debug!(gamma, support = svm.nsupport(), "SVR fitted");

        Ok(Self {
            gamma,
            n_features: x.ncols(),
            svm,
        })
    }

    pub fn n_support(&self) -> usize {
        self.svm.nsupport()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl PartialEq for SupportVectorRegressor {
    fn eq(&self, other: &Self) -> bool {
        self.gamma == other.gamma
            && self.n_features == other.n_features
            && self.svm.rho == other.svm.rho
            && self.svm.alpha == other.svm.alpha
    }
}

impl Regressor for SupportVectorRegressor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        check_features(self.n_features, x)?;
        let predictions: Array1<f64> = Predict::predict(&self.svm, x);
        Ok(predictions)
    }
}
