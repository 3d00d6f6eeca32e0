//! HTTP gateway for the prediction service, built on axum.

use super::request::PredictRequest;
use super::service::{PredictError, PredictionResult, PredictionService};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use slopefos_core::ServerConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared, immutable service handle for handlers.
pub type SharedService = Arc<PredictionService>;

#[derive(Serialize)]
struct PredictResponse<'a> {
    success: bool,
    #[serde(flatten)]
    result: &'a PredictionResult,
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let mut error = json!({
            "type": self.kind(),
            "message": self.to_string(),
        });
        if let Some(field) = self.field() {
            error["field"] = json!(field);
        }
        if let Some(layer) = self.layer() {
            error["layer"] = json!(layer);
        }
        if let Some(range) = self.range() {
            error["range"] = json!(range);
        }
        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}

/// Routes without middleware.
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/predict", post(predict_handler))
        .with_state(service)
}

/// Routes with request tracing and, when enabled, permissive CORS.
pub fn app(service: SharedService, config: &ServerConfig) -> Router {
    let app = router(service).layer(TraceLayer::new_for_http());
    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn home_handler() -> impl IntoResponse {
    Json(json!({
        "message": "FoS Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/predict": "POST - Make FoS prediction",
            "/models": "GET - Get model information",
            "/health": "GET - Check API health",
        }
    }))
}

async fn health_handler(State(service): State<SharedService>) -> impl IntoResponse {
    let loaded = service.is_ready();
    Json(json!({
        "status": if loaded { "healthy" } else { "models not loaded" },
        "models_loaded": loaded,
    }))
}

async fn models_handler(State(service): State<SharedService>) -> impl IntoResponse {
    Json(service.catalog())
}

async fn predict_handler(State(service): State<SharedService>, body: Bytes) -> Response {
    if let Some(reason) = service.unavailable_reason() {
        return PredictError::ModelUnavailable {
            reason: reason.to_string(),
        }
        .into_response();
    }
    let outcome = serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(|e| PredictError::MalformedRequest(format!("invalid JSON body: {e}")))
        .and_then(|value| PredictRequest::from_json(&value))
        .and_then(|request| request.execute(&service));
    match outcome {
        Ok(result) => Json(PredictResponse {
            success: true,
            result: &result,
        })
        .into_response(),
        Err(e) => {
            if e.is_client_error() {
                tracing::debug!(error = %e, "Rejected prediction request");
            }
            e.into_response()
        }
    }
}

/// Bind and serve until Ctrl-C.
pub async fn run(
    service: PredictionService,
    config: &ServerConfig,
) -> Result<(), std::io::Error> {
    let app = app(Arc::new(service), config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Prediction API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
}
