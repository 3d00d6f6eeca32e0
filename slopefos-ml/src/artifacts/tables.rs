//! CSV tables written alongside the models for report generators.

use crate::training::{PredictionRow, RegressionMetrics};
use slopefos_core::ModelId;
use std::borrow::Cow;
use std::fmt::Write;

pub const METRICS_HEADER: &str = "Model,R² Score,RMSE,MAE";
pub const PREDICTIONS_HEADER: &str = "Actual FoS,Predicted FoS,Error";

/// Quote a field when it would break the row.
fn field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Metrics per model, sorted by R² descending.
pub fn metrics_table(rows: &[(ModelId, RegressionMetrics)]) -> String {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| b.1.r2.total_cmp(&a.1.r2));
    let mut out = String::from(METRICS_HEADER);
    out.push('\n');
    for (id, m) in sorted {
        let _ = writeln!(
            out,
            "{},{},{},{}",
            field(id.display_name()),
            m.r2,
            m.rmse,
            m.mae
        );
    }
    out
}

pub fn predictions_table(rows: &[PredictionRow]) -> String {
    let mut out = String::from(PREDICTIONS_HEADER);
    out.push('\n');
    for row in rows {
        let _ = writeln!(out, "{},{},{}", row.actual, row.predicted, row.error);
    }
    out
}
