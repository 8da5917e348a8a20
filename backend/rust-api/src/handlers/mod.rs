use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let store = state.engine.store();
    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        store.ping(),
    )
    .await
    {
        Ok(Ok(())) => json!({ "status": "healthy", "backend": store.backend_name() }),
        Ok(Err(e)) => json!({
            "status": "unhealthy",
            "backend": store.backend_name(),
            "error": e.to_string()
        }),
        Err(_) => json!({
            "status": "unhealthy",
            "backend": store.backend_name(),
            "error": "store ping timeout after 1s"
        }),
    };
    let all_healthy = store_health.get("status").and_then(|v| v.as_str()) == Some("healthy");
    dependencies.insert("duel_store".to_string(), store_health);
    dependencies.insert(
        "question_bank".to_string(),
        json!({ "source": format!("{:?}", state.config.question_source).to_lowercase() }),
    );

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "duel-arena-api",
            "version": env!("CARGO_PKG_VERSION"),
            "supervised_duels": state.supervisor.supervised_count(),
            "dependencies": dependencies
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic guard for `/metrics`; credentials come from `METRICS_AUTH`
/// (`user:password`).
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| basic_credentials_match(value, &expected));

    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

fn basic_credentials_match(header_value: &str, expected: &str) -> bool {
    header_value
        .strip_prefix("Basic ")
        .and_then(|encoded| general_purpose::STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|credentials| credentials == expected)
}

pub mod duels;
pub mod sse;
