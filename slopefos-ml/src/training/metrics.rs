//! Regression metrics.

use crate::error::MlError;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Goodness of fit of a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mse: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<Self, MlError> {
        if actual.len() != predicted.len() {
            return Err(MlError::shape(format!(
                "{} actual values but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(MlError::invalid_input("cannot score zero predictions"));
        }
        let n = actual.len() as f64;
        let errors = actual - predicted;
        let mse = errors.mapv(|e| e * e).sum() / n;
        let mae = errors.mapv(f64::abs).sum() / n;
        Ok(Self {
            r2: r2_score(actual, predicted),
            rmse: mse.sqrt(),
            mae,
            mse,
        })
    }
}

/// Coefficient of determination.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let Some(mean) = actual.mean() else {
        return 0.0;
    };
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}
