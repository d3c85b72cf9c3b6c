//! Process liveness/readiness flags and the routes that report them.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use axum::{http::header, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};

static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }

/// `/live`, `/ready` and `/metrics`, stateless so they merge into any service router.
pub fn health_routes() -> Router {
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({"live": is_live()})) }))
        .route("/ready", get(|| async { Json(serde_json::json!({"ready": is_ready()})) }))
        .route("/metrics", get(metrics_handler))
}

/// Prometheus text exposition of the default registry.
pub fn render_metrics() -> Result<String> {
    let families = prometheus::default_registry().gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

async fn metrics_handler() -> axum::response::Response {
    match render_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "metrics encode failed");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    #[test]
    fn readiness_toggles() {
        mark_ready();
        assert!(is_ready());
        clear_ready();
        assert!(!is_ready());
    }

    #[tokio::test]
    async fn live_route_reports_json() {
        let resp = health_routes()
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["live"].is_boolean());
    }
}
