//! # slopefos-ml: dataset extraction, regression training, and FoS serving
//!
//! The training side turns a block-structured slope-stability spreadsheet
//! into a clean dataset, trains a roster of six regressors on it, and
//! persists the promoted models as a checksummed artifact set. The serving
//! side loads that set and answers single- and multi-layer FoS predictions
//! over HTTP.

// Data engineering
pub mod data;
pub mod features;

// Models and training
pub mod algorithms;
pub mod training;

// Persistence and serving
pub mod artifacts;
pub mod inference;

pub mod error;
pub mod pipeline;

// Re-exports
pub use artifacts::{ArtifactManifest, ArtifactStore};
pub use data::{Dataset, Extractor, FeatureColumn, SheetSchema};
pub use error::MlError;
pub use features::StandardScaler;
pub use inference::{LayerInput, ModelChoice, PredictError, PredictionService};
pub use pipeline::{PipelineSummary, run_pipeline};
pub use training::{Leaderboard, ModelBank, RegressionMetrics};
