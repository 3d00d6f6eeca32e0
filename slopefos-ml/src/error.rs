//! Error types for the slopefos-ml crate.
//!
//! Per-block parse problems and per-model fit failures are not errors here:
//! they are counted in the extraction report and recorded as fit failures.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for training, persistence, and inference.
#[derive(Debug, Error)]
pub enum MlError {
    /// The source sheet could not be read.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Extraction produced no usable samples; nothing can be trained.
    #[error("No usable samples in {}", path.display())]
    DatasetEmpty { path: PathBuf },

    #[error("Training error: {0}")]
    Training(String),

    /// A fitted model could not produce usable predictions.
    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),

    /// Matrix, target, or scaler dimensions disagree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    /// A manifest, or a model the caller asked for, is not in the artifact set.
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    #[error("Checksum mismatch for {file}")]
    ChecksumMismatch { file: String },

    #[error("Unsupported artifact format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingArtifact(msg.into())
    }

    /// Whether the artifact set is absent or incomplete rather than corrupt.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingArtifact(_))
    }
}
