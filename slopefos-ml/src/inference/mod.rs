//! Inference: the prediction service and its HTTP gateway.

pub mod request;
pub mod safety;
pub mod server;
pub mod service;

pub use request::PredictRequest;
pub use safety::{ConfidenceInterval, SafetyAssessment, SafetyStatus};
pub use server::{SharedService, app, router, run};
pub use service::{
    FEATURE_RANGES, LayerInput, ModelCatalog, ModelChoice, PredictError, PredictionResult,
    PredictionService, SERVABLE_MODELS,
};
