//! Parsing `POST /predict` bodies.
//!
//! Numbers may arrive as JSON numbers or numeric strings, so the body is
//! read as a [`serde_json::Value`] and each field is checked by hand.
//! Each layer is range-checked as soon as it is decoded.

use super::service::{
    LayerInput, LayerRef, ModelChoice, PredictError, PredictionResult, PredictionService,
    validate_layer,
};
use serde_json::{Map, Value};

/// A decoded prediction request.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictRequest {
    Single {
        layer: LayerInput,
        model: ModelChoice,
    },
    MultiLayer {
        layers: Vec<LayerInput>,
        model: ModelChoice,
    },
}

impl PredictRequest {
    /// A body with a `layers` key is multi-layer; anything else is single-layer.
    pub fn from_json(body: &Value) -> Result<Self, PredictError> {
        let object = body
            .as_object()
            .ok_or_else(|| PredictError::MalformedRequest("expected a JSON object".into()))?;
        let model = ModelChoice::parse(object.get("model").and_then(Value::as_str));

        match object.get("layers") {
            Some(Value::Array(items)) => {
                // Layers are decoded and range-checked in order, so the first
                // bad layer is the one reported.
                let layers = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let name = item.get("name").and_then(layer_name);
                        let at = LayerRef {
                            index: i + 1,
                            name: name.clone(),
                        };
                        let fields = item.as_object().ok_or_else(|| {
                            PredictError::MalformedRequest(format!("{at} must be a JSON object"))
                        })?;
                        parse_layer(fields, Some(at))
                    })
                    .collect::<Result<Vec<_>, PredictError>>()?;
                Ok(Self::MultiLayer { layers, model })
            }
            Some(Value::Null) | None => Ok(Self::Single {
                layer: parse_layer(object, None)?,
                model,
            }),
            Some(_) => Err(PredictError::MalformedRequest(
                "\"layers\" must be an array".into(),
            )),
        }
    }

    pub fn model(&self) -> ModelChoice {
        match self {
            Self::Single { model, .. } | Self::MultiLayer { model, .. } => *model,
        }
    }

    pub fn execute(&self, service: &PredictionService) -> Result<PredictionResult, PredictError> {
        match self {
            Self::Single { layer, model } => service.predict_single(layer, *model),
            Self::MultiLayer { layers, model } => service.predict_multi_layer(layers, *model),
        }
    }
}

fn layer_name(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_layer(
    fields: &Map<String, Value>,
    at: Option<LayerRef>,
) -> Result<LayerInput, PredictError> {
    let required = |field: &'static str| -> Result<f64, PredictError> {
        match fields.get(field) {
            None | Some(Value::Null) => Err(PredictError::MissingField {
                field,
                layer: at.clone(),
            }),
            Some(value) => number(value).ok_or_else(|| PredictError::InvalidValue {
                field,
                layer: at.clone(),
            }),
        }
    };
    let cohesion = required("cohesion")?;
    let friction_angle = required("friction_angle")?;
    let unit_weight = required("unit_weight")?;
    let ru = match fields.get("ru") {
        None | Some(Value::Null) => 0.0,
        Some(_) => required("ru")?,
    };
    let mut layer = LayerInput::new(cohesion, friction_angle, unit_weight, ru);
    layer.name = at.as_ref().and_then(|a| a.name.clone());
    validate_layer(&layer, at)?;
    Ok(layer)
}

/// A finite number from a JSON number or numeric string.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_layer_with_string_numbers() {
        let request = PredictRequest::from_json(&json!({
            "cohesion": "25.5",
            "friction_angle": 30,
            "unit_weight": 18.0,
            "model": "xgboost"
        }))
        .unwrap();
        assert_eq!(
            request,
            PredictRequest::Single {
                layer: LayerInput::new(25.5, 30.0, 18.0, 0.0),
                model: ModelChoice::XgBoost,
            }
        );
    }

    #[test]
    fn test_multi_layer() {
        let request = PredictRequest::from_json(&json!({
            "layers": [
                {"name": "Laterite", "cohesion": 20, "friction_angle": 28, "unit_weight": 19, "ru": 0.1},
                {"cohesion": 5, "friction_angle": 22, "unit_weight": "17"}
            ]
        }))
        .unwrap();
        let PredictRequest::MultiLayer { layers, model } = request else {
            panic!("expected multi-layer request");
        };
        assert_eq!(model, ModelChoice::GradientBoosting);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].name.as_deref(), Some("Laterite"));
        assert_eq!(layers[0].ru, 0.1);
        assert_eq!(layers[1].name, None);
        assert_eq!(layers[1].unit_weight, 17.0);
    }

    #[test]
    fn test_empty_layers_parse() {
        let request = PredictRequest::from_json(&json!({"layers": []})).unwrap();
        assert_eq!(
            request,
            PredictRequest::MultiLayer {
                layers: vec![],
                model: ModelChoice::GradientBoosting
            }
        );
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let err = PredictRequest::from_json(&json!({"cohesion": 10, "unit_weight": 18})).unwrap_err();
        assert_eq!(
            err,
            PredictError::MissingField {
                field: "friction_angle",
                layer: None
            }
        );

        let err = PredictRequest::from_json(&json!({
            "layers": [{"name": "Clay", "cohesion": "abc", "friction_angle": 20, "unit_weight": 18}]
        }))
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_value");
        assert_eq!(err.to_string(), "Layer 1 (Clay): \"cohesion\" must be a number");

        let err = PredictRequest::from_json(&json!({
            "cohesion": 10, "friction_angle": 20, "unit_weight": 18, "ru": "NaN"
        }))
        .unwrap_err();
        assert_eq!(err.field(), Some("ru"));
    }

    #[test]
    fn test_first_bad_layer_is_reported() {
        let err = PredictRequest::from_json(&json!({
            "layers": [
                {"cohesion": 150, "friction_angle": 30, "unit_weight": 18},
                {"cohesion": 10, "friction_angle": 30}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.field(), Some("cohesion"));
        assert_eq!(err.layer().map(|l| l.index), Some(1));

        let err = PredictRequest::from_json(&json!({
            "layers": [
                {"cohesion": 10, "friction_angle": 30},
                {"cohesion": 10, "friction_angle": 90, "unit_weight": 18}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.kind(), "missing_field");
        assert_eq!(err.field(), Some("unit_weight"));
    }

    #[test]
    fn test_single_layer_out_of_range() {
        let err = PredictRequest::from_json(&json!({
            "cohesion": 10, "friction_angle": 30, "unit_weight": 18, "ru": 2
        }))
        .unwrap_err();
        assert_eq!(err.field(), Some("ru"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_malformed_bodies() {
        for body in [json!([1, 2]), json!("text"), json!({"layers": {"a": 1}})] {
            let err = PredictRequest::from_json(&body).unwrap_err();
            assert_eq!(err.kind(), "malformed_request", "{body}");
        }
        let err = PredictRequest::from_json(&json!({"layers": [3]})).unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
    }
}
