//! Regression algorithms: trees, ensembles, kernel and neural models.
//!
//! Every model implements [`Regressor`]. [`ModelSpec`] pairs a roster
//! identifier with its hyperparameters and fits the matching family;
//! [`TrainedModel`] is the serializable result.

pub mod boosting;
pub mod forest;
pub mod neural;
pub mod svr;
pub mod tree;

pub use boosting::{BoostedTrees, BoostingParams};
pub use forest::RandomForestRegressor;
pub use neural::MlpRegressor;
pub use svr::SupportVectorRegressor;

use crate::error::MlError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use slopefos_core::config::{
    ForestParams, GbParams, LgbmParams, MlpParams, RosterConfig, SvmParams, XgbParams,
};
use slopefos_core::ModelId;

/// A fitted model that maps feature rows to a continuous target.
pub trait Regressor: Send + Sync {
    /// Number of input columns the model was fitted on.
    fn n_features(&self) -> usize;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError>;
}

/// Hyperparameters of one roster entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    Svm(SvmParams),
    RandomForest(ForestParams),
    XgBoost(XgbParams),
    LightGbm(LgbmParams),
    GradientBoosting(GbParams),
    Ann(MlpParams),
}

impl ModelSpec {
    pub fn from_roster(id: ModelId, roster: &RosterConfig) -> Self {
        match id {
            ModelId::Svm => Self::Svm(roster.svm.clone()),
            ModelId::RandomForest => Self::RandomForest(roster.random_forest.clone()),
            ModelId::XgBoost => Self::XgBoost(roster.xgboost.clone()),
            ModelId::LightGbm => Self::LightGbm(roster.lightgbm.clone()),
            ModelId::GradientBoosting => Self::GradientBoosting(roster.gradient_boosting.clone()),
            ModelId::Ann => Self::Ann(roster.ann.clone()),
        }
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainedModel, MlError> {
        Ok(match self {
            Self::Svm(p) => TrainedModel::Svm(SupportVectorRegressor::fit(x, y, p)?),
            Self::RandomForest(p) => {
                TrainedModel::RandomForest(RandomForestRegressor::fit(x, y, p)?)
            }
            Self::XgBoost(p) => {
                TrainedModel::Boosted(BoostedTrees::fit(x, y, &BoostingParams::xgboost(p))?)
            }
            Self::LightGbm(p) => {
                TrainedModel::Boosted(BoostedTrees::fit(x, y, &BoostingParams::lightgbm(p))?)
            }
            Self::GradientBoosting(p) => TrainedModel::Boosted(BoostedTrees::fit(
                x,
                y,
                &BoostingParams::gradient_boosting(p, x.ncols()),
            )?),
            Self::Ann(p) => TrainedModel::Mlp(MlpRegressor::fit(x, y, p)?),
        })
    }
}

/// A fitted model of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    Svm(SupportVectorRegressor),
    RandomForest(RandomForestRegressor),
    Boosted(BoostedTrees),
    Mlp(MlpRegressor),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Regressor {
        match self {
            Self::Svm(m) => m,
            Self::RandomForest(m) => m,
            Self::Boosted(m) => m,
            Self::Mlp(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let predictions = self.inner().predict(x)?;
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(MlError::model("model produced non-finite predictions"));
        }
        Ok(predictions)
    }
}

/// Reject training data that no model can fit.
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(MlError::training("training matrix is empty"));
    }
    if x.nrows() != y.len() {
        return Err(MlError::training(format!(
            "{} training rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(MlError::training("training data contains non-finite values"));
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<(), MlError> {
    if x.ncols() != expected {
        return Err(MlError::shape(format!(
            "model expects {expected} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_spec_follows_roster_entry() {
        let mut roster = RosterConfig::default();
        roster.random_forest.n_estimators = 7;
        match ModelSpec::from_roster(ModelId::RandomForest, &roster) {
            ModelSpec::RandomForest(p) => assert_eq!(p.n_estimators, 7),
            other => panic!("unexpected spec {other:?}"),
        }
        assert!(matches!(
            ModelSpec::from_roster(ModelId::Ann, &roster),
            ModelSpec::Ann(_)
        ));
    }

    #[test]
    fn test_trained_model_serde_roundtrip() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let spec = ModelSpec::RandomForest(ForestParams {
            n_estimators: 3,
            ..ForestParams::default()
        });
        let model = spec.fit(&x, &y).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"family\":\"random_forest\""));
        let back: TrainedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_training_data_checks() {
        let x = array![[1.0], [f64::NAN]];
        let y = array![1.0, 2.0];
        assert!(check_training_data(&x, &y).is_err());
        let x = array![[1.0], [2.0]];
        assert!(check_training_data(&x, &array![1.0]).is_err());
        assert!(check_training_data(&Array2::zeros((0, 2)), &Array1::zeros(0)).is_err());
        assert!(check_training_data(&x, &y).is_ok());
    }
}
