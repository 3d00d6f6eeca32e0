//! The model bank: trains the roster and evaluates promoted models.

use super::leaderboard::{Leaderboard, ModelResult};
use super::metrics::RegressionMetrics;
use crate::algorithms::{ModelSpec, Regressor, TrainedModel};
use crate::error::MlError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use slopefos_core::{ModelId, RosterConfig};
use std::time::Instant;

/// A roster model and its hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: ModelId,
    pub spec: ModelSpec,
}

/// A roster model that could not be trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    pub model: ModelId,
    pub reason: String,
}

/// Outcome of training the whole roster.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub leaderboard: Leaderboard,
    pub failures: Vec<FitFailure>,
}

/// One held-out prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub actual: f64,
    pub predicted: f64,
    /// `actual - predicted`
    pub error: f64,
}

/// Held-out scores of a promoted model.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub id: ModelId,
    pub metrics: RegressionMetrics,
    pub rows: Vec<PredictionRow>,
}

/// Trains every roster entry independently.
#[derive(Debug, Clone)]
pub struct ModelBank {
    roster: Vec<RosterEntry>,
}

impl ModelBank {
    pub fn new(roster: Vec<RosterEntry>) -> Self {
        Self { roster }
    }

    /// The full six-model roster with the configured hyperparameters.
    pub fn from_config(config: &RosterConfig) -> Self {
        Self::new(
            ModelId::ALL
                .into_iter()
                .map(|id| RosterEntry {
                    id,
                    spec: ModelSpec::from_roster(id, config),
                })
                .collect(),
        )
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// Fit and score every roster model on the (scaled) training data.
    ///
    /// A model that fails is recorded in [`TrainingRun::failures`] and the
    /// rest continue.
    pub fn train_all(&self, x: &Array2<f64>, y: &Array1<f64>) -> TrainingRun {
        let mut results = Vec::with_capacity(self.roster.len());
        let mut failures = Vec::new();

        for (position, entry) in self.roster.iter().enumerate() {
            tracing::info!(model = %entry.id, "Training model");
            let started = Instant::now();
            match fit_and_score(entry, x, y) {
                Ok((model, metrics, predictions)) => {
                    tracing::info!(
                        model = %entry.id,
                        r2 = metrics.r2,
                        rmse = metrics.rmse,
                        mae = metrics.mae,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Model trained"
                    );
                    results.push(ModelResult {
                        id: entry.id,
                        model,
                        metrics,
                        predictions,
                        roster_position: position,
                    });
                }
                Err(e) => {
                    tracing::warn!(model = %entry.id, error = %e, "Model failed to train");
                    failures.push(FitFailure {
                        model: entry.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        TrainingRun {
            leaderboard: Leaderboard::from_results(results),
            failures,
        }
    }

    /// Score the `selected` models on held-out data, in selection order.
    pub fn test_selected(
        leaderboard: &Leaderboard,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        selected: &[ModelId],
    ) -> Result<Vec<TestResult>, MlError> {
        let mut tested = Vec::with_capacity(selected.len());
        for &id in selected {
            let Some(entry) = leaderboard.get(id) else {
                tracing::warn!(model = %id, "No trained model to test, skipping");
                continue;
            };
            let predicted = entry.model.predict(x_test)?;
            let metrics = RegressionMetrics::compute(y_test, &predicted)?;
            tracing::info!(
                model = %id,
                r2 = metrics.r2,
                rmse = metrics.rmse,
                mae = metrics.mae,
                "Model tested"
            );
            let rows = y_test
                .iter()
                .zip(predicted.iter())
                .map(|(&actual, &predicted)| PredictionRow {
                    actual,
                    predicted,
                    error: actual - predicted,
                })
                .collect();
            tested.push(TestResult { id, metrics, rows });
        }
        Ok(tested)
    }
}

fn fit_and_score(
    entry: &RosterEntry,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(TrainedModel, RegressionMetrics, Vec<f64>), MlError> {
    let model = entry.spec.fit(x, y)?;
    let predictions = model.predict(x)?;
    let metrics = RegressionMetrics::compute(y, &predictions)?;
    Ok((model, metrics, predictions.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopefos_core::config::{ForestParams, MlpParams, SvmParams, XgbParams};

    fn problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            ((i * (j + 2) + j) % 17) as f64 / 8.0 - 1.0
        });
        let y = x
            .rows()
            .into_iter()
            .map(|r| 1.3 + 0.4 * r[0] - 0.2 * r[1] + 0.1 * r[2])
            .collect();
        (x, y)
    }

    fn quick_bank() -> ModelBank {
        ModelBank::new(vec![
            RosterEntry {
                id: ModelId::RandomForest,
                spec: ModelSpec::RandomForest(ForestParams {
                    n_estimators: 10,
                    ..ForestParams::default()
                }),
            },
            RosterEntry {
                id: ModelId::XgBoost,
                spec: ModelSpec::XgBoost(XgbParams {
                    n_estimators: 30,
                    ..XgbParams::default()
                }),
            },
            RosterEntry {
                id: ModelId::Svm,
                spec: ModelSpec::Svm(SvmParams {
                    c: -1.0,
                    ..SvmParams::default()
                }),
            },
        ])
    }

    #[test]
    fn test_from_config_covers_roster() {
        let bank = ModelBank::from_config(&RosterConfig::default());
        let ids: Vec<ModelId> = bank.roster().iter().map(|e| e.id).collect();
        assert_eq!(ids, ModelId::ALL.to_vec());
    }

    #[test]
    fn test_failed_fit_is_isolated() {
        let (x, y) = problem(40);
        let run = quick_bank().train_all(&x, &y);
        assert_eq!(run.leaderboard.len(), 2);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].model, ModelId::Svm);
        assert!(run.failures[0].reason.contains("C must be positive"));
        assert!(run.leaderboard.get(ModelId::Svm).is_none());
        for entry in run.leaderboard.entries() {
            assert_eq!(entry.predictions.len(), 40);
        }
    }

    #[test]
    fn test_test_selected_rows_and_order() {
        let (x, y) = problem(40);
        let run = quick_bank().train_all(&x, &y);
        let (x_test, y_test) = problem(8);
        let tested = ModelBank::test_selected(
            &run.leaderboard,
            &x_test,
            &y_test,
            &[ModelId::XgBoost, ModelId::Ann, ModelId::RandomForest],
        )
        .unwrap();
        assert_eq!(tested.len(), 2);
        assert_eq!(tested[0].id, ModelId::XgBoost);
        assert_eq!(tested[1].id, ModelId::RandomForest);
        for row in &tested[0].rows {
            assert_eq!(row.error, row.actual - row.predicted);
        }
        assert_eq!(tested[0].rows.len(), 8);
    }

    #[test]
    fn test_all_models_failing_leaves_empty_leaderboard() {
        let (x, y) = problem(10);
        let bank = ModelBank::new(vec![RosterEntry {
            id: ModelId::Ann,
            spec: ModelSpec::Ann(MlpParams {
                hidden_layers: vec![],
                ..MlpParams::default()
            }),
        }]);
        let run = bank.train_all(&x, &y);
        assert!(run.leaderboard.is_empty());
        assert_eq!(run.failures.len(), 1);
    }
}
