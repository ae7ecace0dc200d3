use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::idempotency::codec::BufferedResponse;
use crate::idempotency::handler::IdempotencyGate;

/// axum middleware that puts an [`IdempotencyGate`] in front of the inner router.
///
/// Mount with `axum::middleware::from_fn_with_state(gate, idempotency_middleware)`.
/// Guarded responses are drained into memory before they are cached; 5xx responses count
/// as downstream failures and are passed back without being cached.
pub async fn idempotency_middleware(
    State(gate): State<Arc<IdempotencyGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.guard_key(&request).is_none() {
        gate.record_bypass();
        return next.run(request).await;
    }

    let result = gate
        .process(request, |request: Request<Body>| async move {
            let response = BufferedResponse::from_response(next.run(request).await).await?;
            if response.status.is_server_error() {
                return Err(AppError::Downstream(Box::new(response)));
            }
            Ok(response)
        })
        .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}
