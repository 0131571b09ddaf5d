//! HTTP routes and handlers

use crate::app::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use textgate_core::{ContentAnalysisRequest, ContentsAnalysisResponse, Error, RequestHeaders};
use textgate_detectors::DetectorRegistry;
use tracing::debug;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/registry", get(registry))
        .route("/api/v1/text/contents", post(analyze_contents))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Prometheus exposition of every detector series plus user counters
async fn metrics(State(state): State<AppState>) -> String {
    state.instruments.render_prometheus()
}

/// Registry listing: `{registry_name: {function_name: doc}}`, where a doc
/// string that parses as JSON is returned parsed
async fn registry(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut result = serde_json::Map::new();
    for registry in state.detectors.registries() {
        let mut functions = serde_json::Map::new();
        for function in registry.functions() {
            let doc = serde_json::from_str::<serde_json::Value>(&function.doc)
                .unwrap_or(serde_json::Value::String(function.doc));
            functions.insert(function.name, doc);
        }
        result.insert(
            registry.registry_name().to_string(),
            serde_json::Value::Object(functions),
        );
    }
    Json(serde_json::Value::Object(result))
}

/// Batch content analysis: fan each content item out to the requested
/// registries and return the aggregated detections in input order
async fn analyze_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ContentAnalysisRequest>,
) -> Result<Json<ContentsAnalysisResponse>, AppError> {
    debug!(
        contents = request.contents.len(),
        kinds = ?request.detector_params.keys().collect::<Vec<_>>(),
        "content analysis request"
    );

    let headers = lower_headers(&headers);
    let root = state.detectors.analyze(&request, &headers).await?;
    Ok(Json(ContentsAnalysisResponse { root }))
}

// lower-cased names, UTF-8-lossy values
fn lower_headers(headers: &HeaderMap) -> RequestHeaders {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect()
}

/// Error wrapper mapping the detector taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct AppError(Error);

impl From<Error> for AppError {
    fn from(error: Error) -> Self {
        AppError(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match &self.0 {
            Error::Caller(message) => {
                (StatusCode::BAD_REQUEST, message.clone(), "invalid_request_error")
            }
            error @ Error::InternalDetector { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                "internal_error",
            ),
            // defensive catch-all: nothing else should reach a handler,
            // and whatever does must not leak detail
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                "internal_error",
            ),
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
