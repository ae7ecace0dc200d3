#![allow(dead_code)]

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use idempotency_gate::error::Result;
use idempotency_gate::idempotency::{BufferedResponse, GateConfig, IdempotencyGate, InMemoryStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type Downstream = Pin<Box<dyn Future<Output = Result<BufferedResponse>> + Send>>;

pub const KEY_HEADER: &str = "Idempotency-Key";

/// Gate settings scaled down so waits finish quickly in tests.
pub fn fast_config() -> GateConfig {
    GateConfig {
        ttl: Duration::from_secs(60),
        lock_ttl: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        max_polls: 100,
        ..GateConfig::default()
    }
}

pub fn setup_gate(config: GateConfig) -> (Arc<IdempotencyGate>, InMemoryStore) {
    let store = InMemoryStore::new();
    let gate = Arc::new(IdempotencyGate::new(Arc::new(store.clone()), config));
    (gate, store)
}

pub fn request(method: Method, key: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().method(method).uri("/v1/appointments");
    if let Some(key) = key {
        builder = builder.header(KEY_HEADER, key);
    }
    builder.body(()).expect("valid request")
}

pub fn json_response(status: StatusCode, body: &str) -> BufferedResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    BufferedResponse::new(status, headers, Bytes::copy_from_slice(body.as_bytes()))
}

/// Counts downstream invocations.
#[derive(Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Downstream that answers `response` after `delay`.
    pub fn responder<B>(
        &self,
        delay: Duration,
        response: BufferedResponse,
    ) -> impl FnOnce(Request<B>) -> Downstream {
        let counter = self.clone();
        move |_request: Request<B>| -> Downstream {
            Box::pin(async move {
                counter.hit();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            })
        }
    }
}
