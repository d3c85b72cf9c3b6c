//! Thin axum binding over [`RiskService`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::error::RiskEngineError;
use crate::scoring::RawScoreRequest;
use crate::service::RiskService;

#[derive(Debug, Deserialize)]
pub struct BatchScoreRequest {
    pub items: Vec<RawScoreRequest>,
}

pub fn router(service: RiskService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/model/versions", get(model_versions))
        .route("/model/reload", post(model_reload))
        .route("/score", post(score))
        .route("/score_batch", post(score_batch))
        .with_state(service)
        .merge(reliscore_core::health_routes())
}

pub enum ApiError {
    Engine(RiskEngineError),
    Internal(String),
}

impl From<RiskEngineError> for ApiError {
    fn from(e: RiskEngineError) -> Self { Self::Engine(e) }
}

pub fn status_for(e: &RiskEngineError) -> StatusCode {
    match e {
        RiskEngineError::SchemaMismatch { .. } | RiskEngineError::InvalidFeatureValue { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RiskEngineError::VersionNotFound(_) => StatusCode::NOT_FOUND,
        RiskEngineError::EmptyRegistry(_)
        | RiskEngineError::InvalidArtifact { .. }
        | RiskEngineError::SchemaResolution { .. }
        | RiskEngineError::Configuration { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RiskEngineError::Inference(_) | RiskEngineError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": code, "message": text}`, plus the key sets for schema mismatches.
pub fn error_body(e: &RiskEngineError) -> Value {
    let mut body = json!({"error": e.code(), "message": e.to_string()});
    if let RiskEngineError::SchemaMismatch { missing, extra } = e {
        body["missing"] = json!(missing);
        body["extra"] = json!(extra);
    }
    body
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Engine(e) => {
                if !e.is_client_error() {
                    error!(error = %e, code = e.code(), "request failed");
                }
                (status_for(&e), Json(error_body(&e))).into_response()
            }
            Self::Internal(msg) => {
                error!(error = %msg, "request task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal_error", "message": msg}))).into_response()
            }
        }
    }
}

/// Model loads can hit the filesystem or fit the demo model, so service calls leave the
/// async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(r) => r.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

async fn health(State(svc): State<RiskService>) -> impl IntoResponse {
    Json(svc.get_health())
}

async fn model_info(State(svc): State<RiskService>) -> Result<impl IntoResponse, ApiError> {
    let info = blocking(move || svc.get_model_info()).await?;
    Ok(Json(info))
}

async fn model_versions(State(svc): State<RiskService>) -> Result<impl IntoResponse, ApiError> {
    let versions = blocking(move || svc.list_versions()).await?;
    Ok(Json(versions))
}

async fn model_reload(State(svc): State<RiskService>) -> Result<impl IntoResponse, ApiError> {
    let info = blocking(move || svc.reload()).await?;
    Ok(Json(info))
}

async fn score(State(svc): State<RiskService>, Json(raw): Json<RawScoreRequest>) -> Result<impl IntoResponse, ApiError> {
    let result = blocking(move || {
        let req = raw.into_request()?;
        svc.score(&req)
    })
    .await?;
    Ok(Json(result))
}

/// Per-item results: a score, or an error body in that item's slot.
async fn score_batch(
    State(svc): State<RiskService>,
    Json(batch): Json<BatchScoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let results = blocking(move || svc.score_raw_batch(batch.items)).await?;
    let items: Vec<Value> = results
        .into_iter()
        .map(|r| match r {
            Ok(scored) => serde_json::to_value(scored).unwrap_or_else(|e| json!({"error": "internal_error", "message": e.to_string()})),
            Err(e) => error_body(&e),
        })
        .collect();
    Ok(Json(items))
}
