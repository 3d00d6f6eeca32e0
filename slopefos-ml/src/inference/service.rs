//! The prediction service: validates inputs, scales, predicts, and classifies.
//!
//! The service is immutable once loaded and is shared across request
//! handlers without locking.

use super::safety::{ConfidenceInterval, SafetyAssessment, round4};
use crate::algorithms::Regressor;
use crate::artifacts::{ArtifactStore, PromotedModel};
use crate::data::FeatureColumn;
use crate::error::MlError;
use crate::features::StandardScaler;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use slopefos_core::ModelId;
use std::collections::BTreeMap;
use std::fmt;

/// Models the service can serve.
pub const SERVABLE_MODELS: [ModelId; 2] = [ModelId::GradientBoosting, ModelId::XgBoost];

pub const CALCULATION_METHOD: &str = "Weighted average by unit weight";

/// Which promoted model answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    #[default]
    GradientBoosting,
    #[serde(rename = "xgboost")]
    XgBoost,
}

impl ModelChoice {
    /// Unrecognized or absent names select gradient boosting.
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("xgboost") => Self::XgBoost,
            _ => Self::GradientBoosting,
        }
    }

    pub fn model_id(&self) -> ModelId {
        match self {
            Self::GradientBoosting => ModelId::GradientBoosting,
            Self::XgBoost => ModelId::XgBoost,
        }
    }
}

/// Accepted range of one input field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRange {
    #[serde(skip)]
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl FeatureRange {
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub const FEATURE_RANGES: [FeatureRange; 4] = [
    FeatureRange {
        field: "cohesion",
        min: 0.0,
        max: 100.0,
        unit: "kPa",
    },
    FeatureRange {
        field: "friction_angle",
        min: 0.0,
        max: 45.0,
        unit: "degrees",
    },
    FeatureRange {
        field: "unit_weight",
        min: 15.0,
        max: 25.0,
        unit: "kN/m³",
    },
    FeatureRange {
        field: "ru",
        min: 0.0,
        max: 1.0,
        unit: "ratio",
    },
];

/// Soil properties of one layer (or of a single-layer request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cohesion: f64,
    pub friction_angle: f64,
    pub unit_weight: f64,
    #[serde(default)]
    pub ru: f64,
}

impl LayerInput {
    pub fn new(cohesion: f64, friction_angle: f64, unit_weight: f64, ru: f64) -> Self {
        Self {
            name: None,
            cohesion,
            friction_angle,
            unit_weight,
            ru,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn field(&self, field: &str) -> f64 {
        match field {
            "cohesion" => self.cohesion,
            "friction_angle" => self.friction_angle,
            "unit_weight" => self.unit_weight,
            _ => self.ru,
        }
    }

    fn feature(&self, column: FeatureColumn) -> f64 {
        self.field(column.name())
    }

    fn properties(&self) -> LayerProperties {
        LayerProperties {
            cohesion: self.cohesion,
            friction_angle: self.friction_angle,
            unit_weight: self.unit_weight,
            ru: self.ru,
        }
    }
}

/// Identifies a layer of a multi-layer request in error messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerRef {
    /// 1-based position in the request.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Layer {} ({name})", self.index),
            None => write!(f, "Layer {}", self.index),
        }
    }
}

fn layer_prefix(layer: &Option<LayerRef>) -> String {
    layer.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()
}

/// Why a prediction request was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("{}{field} must be between {min} and {max} {unit}", layer_prefix(.layer))]
    Validation {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
        unit: &'static str,
        layer: Option<LayerRef>,
    },

    #[error("{}missing required field \"{field}\"", layer_prefix(.layer))]
    MissingField {
        field: &'static str,
        layer: Option<LayerRef>,
    },

    #[error("{}\"{field}\" must be a number", layer_prefix(.layer))]
    InvalidValue {
        field: &'static str,
        layer: Option<LayerRef>,
    },

    #[error("no layers provided")]
    NoLayers,

    #[error("models not loaded")]
    ModelUnavailable { reason: String },

    #[error("prediction failed")]
    Inference { reason: String },

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl PredictError {
    /// Stable machine-readable error type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidValue { .. } => "invalid_value",
            Self::NoLayers => "no_layers",
            Self::ModelUnavailable { .. } => "models_unavailable",
            Self::Inference { .. } => "inference_error",
            Self::MalformedRequest(_) => "malformed_request",
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. }
            | Self::MissingField { field, .. }
            | Self::InvalidValue { field, .. } => Some(*field),
            _ => None,
        }
    }

    pub fn layer(&self) -> Option<&LayerRef> {
        match self {
            Self::Validation { layer, .. }
            | Self::MissingField { layer, .. }
            | Self::InvalidValue { layer, .. } => layer.as_ref(),
            _ => None,
        }
    }

    /// The accepted range, for validation failures.
    pub fn range(&self) -> Option<FeatureRange> {
        match self {
            Self::Validation { field, .. } => {
                FEATURE_RANGES.iter().find(|r| r.field == *field).copied()
            }
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::ModelUnavailable { .. } | Self::Inference { .. }
        )
    }
}

/// Check every field of a layer against [`FEATURE_RANGES`].
pub fn validate_layer(layer: &LayerInput, at: Option<LayerRef>) -> Result<(), PredictError> {
    for range in &FEATURE_RANGES {
        let value = layer.field(range.field);
        if !range.contains(value) {
            return Err(PredictError::Validation {
                field: range.field,
                value,
                min: range.min,
                max: range.max,
                unit: range.unit,
                layer: at,
            });
        }
    }
    Ok(())
}

/// `Σ(fos × unit_weight) / Σ unit_weight`.
pub fn weighted_fos(layers: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = layers.iter().map(|(_, w)| w).sum();
    if layers.is_empty() || total <= 0.0 {
        return None;
    }
    Some(layers.iter().map(|(fos, w)| fos * w).sum::<f64>() / total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PredictionType {
    #[serde(rename = "single-layer")]
    SingleLayer,
    #[serde(rename = "multi-layer")]
    MultiLayer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FosPrediction {
    pub fos: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Held-out scores of the model that answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub r2_score: f64,
    pub rmse: f64,
    pub mae: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerProperties {
    pub cohesion: f64,
    pub friction_angle: f64,
    pub unit_weight: f64,
    pub ru: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerPrediction {
    pub name: String,
    pub fos: f64,
    pub properties: LayerProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction_type: PredictionType,
    pub prediction: FosPrediction,
    pub safety: SafetyAssessment,
    pub model: ModelSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<LayerProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerPrediction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<String>,
}

/// One entry of the `/models` catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub test_r2: f64,
    pub test_rmse: f64,
    pub test_mae: f64,
    pub training_r2: f64,
    /// Training R² minus test R², in percentage points.
    pub overfitting_gap: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCatalog {
    pub models: BTreeMap<String, ModelInfo>,
    pub features: Vec<&'static str>,
    pub feature_ranges: BTreeMap<&'static str, FeatureRange>,
}

fn describe(id: ModelId) -> &'static str {
    match id {
        ModelId::GradientBoosting => "Sequential tree ensemble with shrinkage",
        ModelId::XgBoost => "Regularized gradient-boosted trees",
        _ => "Promoted regression model",
    }
}

#[derive(Debug)]
enum State {
    Ready {
        scaler: StandardScaler,
        models: Vec<PromotedModel>,
    },
    Unavailable {
        reason: String,
    },
}

/// Serves FoS predictions from the promoted models.
#[derive(Debug)]
pub struct PredictionService {
    state: State,
}

impl PredictionService {
    pub fn new(scaler: StandardScaler, models: Vec<PromotedModel>) -> Self {
        Self {
            state: State::Ready { scaler, models },
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: State::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// Load the scaler and servable models; a failure leaves the service
    /// unavailable rather than failing startup.
    pub fn load(store: &ArtifactStore) -> Self {
        let bundle = match store.load_promoted(&SERVABLE_MODELS) {
            Ok(bundle) => bundle,
            Err(e) if e.is_missing() => {
                tracing::warn!(dir = %store.dir().display(), error = %e, "No trained models found");
                return Self::unavailable(e.to_string());
            }
            Err(e) => {
                tracing::error!(dir = %store.dir().display(), error = %e, "Failed to load models");
                return Self::unavailable(e.to_string());
            }
        };
        if let Some(bad) = bundle
            .models
            .iter()
            .find(|m| m.model.n_features() != bundle.scaler.n_features())
        {
            let reason = format!(
                "{} expects {} features but the scaler produces {}",
                bad.id,
                bad.model.n_features(),
                bundle.scaler.n_features()
            );
            tracing::error!(%reason, "Failed to load models");
            return Self::unavailable(reason);
        }
        tracing::info!(
            dir = %store.dir().display(),
            models = bundle.models.len(),
            "Models loaded"
        );
        Self::new(bundle.scaler, bundle.models)
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            State::Ready { models, .. } => SERVABLE_MODELS
                .iter()
                .all(|id| models.iter().any(|m| m.id == *id)),
            State::Unavailable { .. } => false,
        }
    }

    /// Why the service cannot predict, if it cannot.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            State::Unavailable { reason } => Some(reason),
            State::Ready { .. } => None,
        }
    }

    pub fn catalog(&self) -> ModelCatalog {
        let (features, models): (Vec<&'static str>, BTreeMap<String, ModelInfo>) = match &self
            .state
        {
            State::Ready { scaler, models } => (
                scaler.columns().iter().map(|c| c.label()).collect(),
                models.iter().map(model_info).collect(),
            ),
            State::Unavailable { .. } => (
                FeatureColumn::columns(true).iter().map(|c| c.label()).collect(),
                BTreeMap::new(),
            ),
        };
        ModelCatalog {
            models,
            features,
            feature_ranges: FEATURE_RANGES.iter().map(|r| (r.field, *r)).collect(),
        }
    }

    pub fn predict_single(
        &self,
        layer: &LayerInput,
        choice: ModelChoice,
    ) -> Result<PredictionResult, PredictError> {
        let (scaler, model) = self.resolve(choice)?;
        validate_layer(layer, None)?;
        let raw = predict_raw(scaler, model, layer)?;
        let fos = round4(raw);
        tracing::debug!(model = %model.id, fos, "Single-layer prediction");
        Ok(PredictionResult {
            prediction_type: PredictionType::SingleLayer,
            prediction: FosPrediction {
                fos,
                confidence_interval: ConfidenceInterval::from_rmse(fos, model.test.rmse),
            },
            safety: SafetyAssessment::for_fos(fos),
            model: model_summary(model),
            inputs: Some(layer.properties()),
            layers: None,
            calculation_method: None,
        })
    }

    /// Predict each layer and combine them weighted by unit weight.
    pub fn predict_multi_layer(
        &self,
        layers: &[LayerInput],
        choice: ModelChoice,
    ) -> Result<PredictionResult, PredictError> {
        let (scaler, model) = self.resolve(choice)?;
        if layers.is_empty() {
            return Err(PredictError::NoLayers);
        }
        for (i, layer) in layers.iter().enumerate() {
            validate_layer(
                layer,
                Some(LayerRef {
                    index: i + 1,
                    name: layer.name.clone(),
                }),
            )?;
        }

        let mut weighted = Vec::with_capacity(layers.len());
        let mut predictions = Vec::with_capacity(layers.len());
        for (i, layer) in layers.iter().enumerate() {
            let raw = predict_raw(scaler, model, layer)?;
            weighted.push((raw, layer.unit_weight));
            predictions.push(LayerPrediction {
                name: layer
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Layer {}", i + 1)),
                fos: round4(raw),
                properties: layer.properties(),
            });
        }
        let aggregate = weighted_fos(&weighted).ok_or_else(|| PredictError::Inference {
            reason: "layer unit weights sum to zero".into(),
        })?;
        let fos = round4(aggregate);
        tracing::debug!(model = %model.id, layers = layers.len(), fos, "Multi-layer prediction");

        Ok(PredictionResult {
            prediction_type: PredictionType::MultiLayer,
            prediction: FosPrediction {
                fos,
                confidence_interval: ConfidenceInterval::from_rmse(fos, model.test.rmse),
            },
            safety: SafetyAssessment::for_fos(fos),
            model: model_summary(model),
            inputs: None,
            layers: Some(predictions),
            calculation_method: Some(CALCULATION_METHOD.to_string()),
        })
    }

    fn resolve(
        &self,
        choice: ModelChoice,
    ) -> Result<(&StandardScaler, &PromotedModel), PredictError> {
        match &self.state {
            State::Unavailable { reason } => Err(PredictError::ModelUnavailable {
                reason: reason.clone(),
            }),
            State::Ready { scaler, models } => {
                let id = choice.model_id();
                models
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| (scaler, m))
                    .ok_or_else(|| PredictError::ModelUnavailable {
                        reason: format!("{id} is not loaded"),
                    })
            }
        }
    }
}

fn predict_raw(
    scaler: &StandardScaler,
    model: &PromotedModel,
    layer: &LayerInput,
) -> Result<f64, PredictError> {
    let inference = |e: MlError| {
        tracing::error!(model = %model.id, error = %e, "Inference failed");
        PredictError::Inference {
            reason: e.to_string(),
        }
    };
    let row: Vec<f64> = scaler.columns().iter().map(|&c| layer.feature(c)).collect();
    let scaled = scaler.transform_row(&row).map_err(inference)?;
    let x = Array2::from_shape_vec((1, scaled.len()), scaled)
        .map_err(|e| inference(MlError::inference(e.to_string())))?;
    let predicted = model.model.predict(&x).map_err(inference)?;
    predicted
        .first()
        .copied()
        .ok_or_else(|| inference(MlError::inference("empty prediction")))
}

fn model_summary(model: &PromotedModel) -> ModelSummary {
    ModelSummary {
        name: model.id.display_name().to_string(),
        r2_score: round4(model.test.r2),
        rmse: round4(model.test.rmse),
        mae: round4(model.test.mae),
    }
}

fn model_info(model: &PromotedModel) -> (String, ModelInfo) {
    let gap = (model.training.r2 - model.test.r2) * 100.0;
    (
        model.id.slug().to_string(),
        ModelInfo {
            name: model.id.display_name().to_string(),
            test_r2: round4(model.test.r2),
            test_rmse: round4(model.test.rmse),
            test_mae: round4(model.test.mae),
            training_r2: round4(model.training.r2),
            overfitting_gap: format!("{gap:.2}%"),
            description: describe(model.id).to_string(),
        },
    )
}
