//! Ranked training results and promotion.

use super::metrics::RegressionMetrics;
use crate::algorithms::TrainedModel;
use serde::{Deserialize, Serialize};
use slopefos_core::{ModelId, SelectionPolicy};
use std::cmp::Ordering;

/// One successfully trained model with its in-sample scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResult {
    pub id: ModelId,
    pub model: TrainedModel,
    pub metrics: RegressionMetrics,
    pub predictions: Vec<f64>,
    /// Position of the model in the roster, used to break ties.
    pub roster_position: usize,
}

/// A row of the model comparison table consumed by report generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub model: String,
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub is_promoted: bool,
}

/// Training results ordered best first.
///
/// Order is R² descending, then RMSE ascending, then roster position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaderboard {
    entries: Vec<ModelResult>,
}

fn rank(a: &ModelResult, b: &ModelResult) -> Ordering {
    b.metrics
        .r2
        .total_cmp(&a.metrics.r2)
        .then(a.metrics.rmse.total_cmp(&b.metrics.rmse))
        .then(a.roster_position.cmp(&b.roster_position))
}

impl Leaderboard {
    pub fn from_results(mut entries: Vec<ModelResult>) -> Self {
        entries.sort_by(rank);
        Self { entries }
    }

    pub fn entries(&self) -> &[ModelResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelResult> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn best(&self) -> Option<&ModelResult> {
        self.entries.first()
    }

    /// Models to promote to held-out testing, in promotion order.
    ///
    /// Fixed names absent from the leaderboard (failed fits) are skipped.
    pub fn select(&self, policy: &SelectionPolicy) -> Vec<ModelId> {
        match policy {
            SelectionPolicy::Fixed { models } => {
                let mut selected = Vec::with_capacity(models.len());
                for &id in models {
                    if selected.contains(&id) {
                        continue;
                    }
                    if self.get(id).is_some() {
                        selected.push(id);
                    } else {
                        tracing::warn!(model = %id, "Selected model has no training result, skipping");
                    }
                }
                selected
            }
            SelectionPolicy::Ranked { count } => {
                self.entries.iter().take(*count).map(|e| e.id).collect()
            }
        }
    }

    pub fn comparison_rows(&self, promoted: &[ModelId]) -> Vec<ComparisonRow> {
        self.entries
            .iter()
            .map(|e| ComparisonRow {
                model: e.id.display_name().to_string(),
                r2: e.metrics.r2,
                rmse: e.metrics.rmse,
                mae: e.metrics.mae,
                is_promoted: promoted.contains(&e.id),
            })
            .collect()
    }
}
