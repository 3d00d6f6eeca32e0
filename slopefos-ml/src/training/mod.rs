//! Training: the model bank, leaderboard ranking, and metrics.

pub mod bank;
pub mod leaderboard;
pub mod metrics;

pub use bank::{FitFailure, ModelBank, PredictionRow, RosterEntry, TestResult, TrainingRun};
pub use leaderboard::{ComparisonRow, Leaderboard, ModelResult};
pub use metrics::RegressionMetrics;
