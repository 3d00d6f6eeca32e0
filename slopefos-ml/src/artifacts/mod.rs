//! Artifact persistence: the versioned output directory of a pipeline run.

pub mod store;
pub mod tables;

pub use store::{
    ArtifactManifest, ArtifactStore, PipelineArtifact, PromotedModel, PromotedRecord,
    ResultsSummary, ServingBundle,
};
