use axum::{
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::{idempotency_middleware, IdempotencyGate, KeyValueStore};
use crate::observability::HealthChecker;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<IdempotencyGate>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, gate: Arc<IdempotencyGate>) -> Self {
        let health_checker = Arc::new(HealthChecker::new(store));
        Self {
            gate,
            health_checker,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Routes guarded by the idempotency gate.
pub fn business_router() -> Router {
    Router::new().route("/v1/echo", post(handlers::idempotent_echo))
}

/// Creates the main API router: operational endpoints plus `business` behind the gate.
pub fn create_router(state: AppState, business: Router) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let guarded = business.layer(middleware::from_fn_with_state(
        Arc::clone(&state.gate),
        idempotency_middleware,
    ));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        .with_state(state)
        .merge(guarded)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}
