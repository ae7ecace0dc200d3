use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::api::responses::{ApiResponse, EchoResponse, HealthResponse};
use crate::observability::AggregatedHealth;

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let store = state.health_checker.check_store().await;

    let response = HealthResponse {
        status: format!("{:?}", store.status).to_lowercase(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        store,
        gate: state.gate.stats().snapshot(),
    };

    Json(ApiResponse::success(response))
}

/// Detailed health of every dependency.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(ApiResponse::success(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics exporter not installed".to_string(),
        ),
    }
}

// ============================================================================
// Demonstration Handlers
// ============================================================================

/// Echoes the JSON body back under a freshly generated id.
///
/// Every execution produces a new id, so replays are easy to tell apart from re-executions.
pub async fn idempotent_echo(
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<ApiResponse<EchoResponse>>) {
    (
        StatusCode::CREATED,
        Json(ApiResponse::success(EchoResponse::new(body))),
    )
}
