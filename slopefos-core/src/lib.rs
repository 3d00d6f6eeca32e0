//! # slopefos Core
//!
//! Shared foundation for the slopefos workspace: layered configuration,
//! error types, and the staged-directory persistence helpers the artifact store is
//! built on.

pub mod config;
pub mod error;
pub mod persistence;

// Re-export commonly used types at the crate root.
pub use config::{
    AppConfig, ArtifactConfig, DataConfig, ModelId, RosterConfig, SelectionPolicy, ServerConfig,
    SplitConfig, TrainingConfig, load_config, load_validated_config,
};
pub use error::{ConfigError, CoreError, Result};
