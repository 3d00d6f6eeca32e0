//! Per-feature standardization.

use crate::data::{FeatureColumn, FeatureMatrix};
use crate::error::MlError;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling fitted on training data only.
///
/// Uses the population standard deviation. Constant columns keep a scale of
/// 1, so they are centred but not divided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<FeatureColumn>,
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &FeatureMatrix) -> Result<Self, MlError> {
        let values = x.values();
        if values.nrows() == 0 {
            return Err(MlError::invalid_input("cannot fit a scaler on zero rows"));
        }
        let mean = values
            .mean_axis(Axis(0))
            .ok_or_else(|| MlError::invalid_input("cannot fit a scaler on zero rows"))?;
        let std = values.std_axis(Axis(0), 0.0);
        Ok(Self {
            columns: x.columns().to_vec(),
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn means(&self) -> &[f64] {
        &self.mean
    }

    pub fn stds(&self) -> &[f64] {
        &self.std
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    fn scale(&self, j: usize) -> f64 {
        let std = self.std[j];
        if std <= 10.0 * f64::EPSILON * self.mean[j].abs().max(1.0) {
            1.0
        } else {
            std
        }
    }

    pub fn transform(&self, x: &FeatureMatrix) -> Result<Array2<f64>, MlError> {
        if x.columns() != self.columns.as_slice() {
            return Err(MlError::shape(format!(
                "scaler fitted on [{}] but got [{}]",
                column_list(&self.columns),
                column_list(x.columns())
            )));
        }
        self.transform_values(x.values())
    }

    /// Scale a raw matrix whose columns are in the fitted order.
    pub fn transform_values(&self, values: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        if values.ncols() != self.n_features() {
            return Err(MlError::shape(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                values.ncols()
            )));
        }
        let mut scaled = values.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.mean[j], self.scale(j));
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(scaled)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, MlError> {
        if row.len() != self.n_features() {
            return Err(MlError::shape(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.mean[j]) / self.scale(j))
            .collect())
    }
}

fn column_list(columns: &[FeatureColumn]) -> String {
    columns
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}
