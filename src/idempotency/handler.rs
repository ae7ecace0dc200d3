use axum::http::{HeaderMap, HeaderName, Method, Request, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::IdempotencySettings;
use crate::error::{AppError, Result};
use crate::idempotency::codec::{self, BufferedResponse, CachedResponse};
use crate::idempotency::key_generator::{IdempotencyKeyGenerator, KeyGeneratorConfig};
use crate::idempotency::lock::{LockLease, LockManager};
use crate::idempotency::storage::KeyValueStore;
use crate::observability::{get_metrics, mask_sensitive, LatencyTimer};

/// How the gate resolved one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Not guarded: safe method or no idempotency key
    Bypassed,
    /// Lock acquired, downstream ran and its response was cached
    FirstAttempt,
    /// Cached response found on the first probe
    Replayed,
    /// Cached response appeared while waiting on another owner
    ReplayedAfterWait,
    /// Waited the full poll budget without a result
    InProgress,
    /// Downstream failed during a first attempt
    DownstreamFailed,
    /// The shared store could not be reached
    StoreFailed,
    /// A cached record could not be read back or a response could not be stored
    Errored,
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Bypassed => "bypassed",
            GateOutcome::FirstAttempt => "first_attempt",
            GateOutcome::Replayed => "replayed",
            GateOutcome::ReplayedAfterWait => "replayed_after_wait",
            GateOutcome::InProgress => "in_progress",
            GateOutcome::DownstreamFailed => "downstream_failed",
            GateOutcome::StoreFailed => "store_failed",
            GateOutcome::Errored => "errored",
        }
    }
}

/// In-process counters for gate decisions.
#[derive(Debug, Default)]
pub struct GateStats {
    pub total_requests: AtomicU64,
    pub bypassed_requests: AtomicU64,
    pub first_attempts: AtomicU64,
    pub replays: AtomicU64,
    pub in_flight_waits: AtomicU64,
    pub in_progress_timeouts: AtomicU64,
    pub downstream_failures: AtomicU64,
    pub store_failures: AtomicU64,
    pub gate_errors: AtomicU64,
}

impl GateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: GateOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            GateOutcome::Bypassed => &self.bypassed_requests,
            GateOutcome::FirstAttempt => &self.first_attempts,
            GateOutcome::Replayed | GateOutcome::ReplayedAfterWait => &self.replays,
            GateOutcome::InProgress => &self.in_progress_timeouts,
            GateOutcome::DownstreamFailed => &self.downstream_failures,
            GateOutcome::StoreFailed => &self.store_failures,
            GateOutcome::Errored => &self.gate_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait(&self) {
        self.in_flight_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            bypassed_requests: self.bypassed_requests.load(Ordering::Relaxed),
            first_attempts: self.first_attempts.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            in_flight_waits: self.in_flight_waits.load(Ordering::Relaxed),
            in_progress_timeouts: self.in_progress_timeouts.load(Ordering::Relaxed),
            downstream_failures: self.downstream_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            gate_errors: self.gate_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub bypassed_requests: u64,
    pub first_attempts: u64,
    pub replays: u64,
    pub in_flight_waits: u64,
    pub in_progress_timeouts: u64,
    pub downstream_failures: u64,
    pub store_failures: u64,
    pub gate_errors: u64,
}

/// Configuration for the idempotency gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub header_name: HeaderName,
    pub ttl: Duration,
    pub lock_ttl: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub fenced_release: bool,
    pub keys: KeyGeneratorConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static("idempotency-key"),
            ttl: Duration::from_secs(60 * 60),
            lock_ttl: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            max_polls: 20,
            fenced_release: true,
            keys: KeyGeneratorConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(AppError::Validation("idempotency ttl must be positive".to_string()));
        }
        if self.lock_ttl.is_zero() {
            return Err(AppError::Validation("lock ttl must be positive".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::Validation("poll interval must be positive".to_string()));
        }
        Ok(())
    }
}

impl TryFrom<&IdempotencySettings> for GateConfig {
    type Error = AppError;

    fn try_from(settings: &IdempotencySettings) -> Result<Self> {
        let header_name = HeaderName::from_bytes(settings.header_name.as_bytes()).map_err(|e| {
            AppError::Validation(format!("invalid header name {:?}: {}", settings.header_name, e))
        })?;

        let config = Self {
            header_name,
            ttl: Duration::from_secs(settings.ttl_seconds),
            lock_ttl: Duration::from_secs(settings.lock_ttl_seconds),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            max_polls: settings.max_polls,
            fenced_release: settings.fenced_release,
            keys: KeyGeneratorConfig {
                key_prefix: settings.key_prefix.clone(),
                hash_keys: settings.hash_keys,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Body returned when a duplicate waited out the poll budget.
pub fn in_progress_response() -> BufferedResponse {
    BufferedResponse::json(
        StatusCode::ACCEPTED,
        &serde_json::json!({ "detail": "Request in progress" }),
    )
}

/// Makes mutating requests safe to retry by caching the first attempt's response.
pub struct IdempotencyGate {
    store: Arc<dyn KeyValueStore>,
    locks: LockManager,
    keys: IdempotencyKeyGenerator,
    stats: Arc<GateStats>,
    config: GateConfig,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn KeyValueStore>, config: GateConfig) -> Self {
        let keys = IdempotencyKeyGenerator::new(config.keys.clone());
        let locks = LockManager::new(
            Arc::clone(&store),
            keys.clone(),
            config.lock_ttl,
            config.fenced_release,
        );

        Self {
            store,
            locks,
            keys,
            stats: Arc::new(GateStats::new()),
            config,
        }
    }

    pub fn stats(&self) -> Arc<GateStats> {
        Arc::clone(&self.stats)
    }

    /// Only POST, PUT, PATCH and DELETE are guarded.
    pub fn is_guarded_method(method: &Method) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    }

    /// Reads the caller's idempotency key, if any.
    pub fn extract_key(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.config.header_name)
            .and_then(IdempotencyKeyGenerator::from_header)
    }

    /// The key this request is guarded under, or `None` when it passes straight through.
    pub fn guard_key<B>(&self, request: &Request<B>) -> Option<String> {
        if !Self::is_guarded_method(request.method()) {
            return None;
        }
        self.extract_key(request.headers())
    }

    /// Runs `request` through the gate.
    ///
    /// `downstream` is invoked at most once, and only for bypassed requests or when this
    /// call wins the lock. Store failures are returned as errors; the downstream is never
    /// run unguarded in that case.
    pub async fn process<B, F, Fut>(&self, request: Request<B>, downstream: F) -> Result<BufferedResponse>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<BufferedResponse>>,
    {
        let Some(key) = self.guard_key(&request) else {
            self.finish(GateOutcome::Bypassed);
            return downstream(request).await;
        };

        let span = tracing::info_span!(
            "idempotency_gate",
            key = %mask_sensitive(&key, 4),
            method = %request.method(),
        );
        self.process_guarded(key, request, downstream)
            .instrument(span)
            .await
    }

    /// Records a request the caller let through without calling [`process`](Self::process).
    pub fn record_bypass(&self) {
        self.finish(GateOutcome::Bypassed);
    }

    async fn process_guarded<B, F, Fut>(
        &self,
        key: String,
        request: Request<B>,
        downstream: F,
    ) -> Result<BufferedResponse>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<BufferedResponse>>,
    {
        if let Some(response) = self.lookup(&key).await.map_err(|e| self.fail(e))? {
            tracing::debug!("Replaying cached response");
            self.finish(GateOutcome::Replayed);
            return Ok(response);
        }

        match self.locks.try_acquire(&key).await.map_err(|e| self.fail(e))? {
            Some(lease) => self.run_first_attempt(&key, lease, request, downstream).await,
            None => self.await_in_flight(&key).await,
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<BufferedResponse>> {
        match self.store.get(&self.keys.response_key(key)).await? {
            Some(raw) => {
                let record = CachedResponse::from_json(&raw)?;
                Ok(Some(codec::decode(&record)?))
            }
            None => Ok(None),
        }
    }

    async fn run_first_attempt<B, F, Fut>(
        &self,
        key: &str,
        lease: LockLease,
        request: Request<B>,
        downstream: F,
    ) -> Result<BufferedResponse>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<BufferedResponse>>,
    {
        let masked = mask_sensitive(key, 4);
        let timer = LatencyTimer::new();

        let (result, downstream_failed) = match downstream(request).await {
            Ok(response) => (self.cache(key, &response).await.map(|_| response), false),
            Err(e) => (Err(e), true),
        };

        let elapsed = lease.held_for();
        get_metrics().record_downstream_latency(timer.elapsed_ms(), result.is_ok());
        if elapsed > self.locks.lock_ttl() {
            tracing::warn!(
                key = %masked,
                elapsed_ms = elapsed.as_millis() as u64,
                lock_ttl_ms = self.locks.lock_ttl().as_millis() as u64,
                "First attempt outlived its lock, a concurrent duplicate may have executed"
            );
            get_metrics().record_lock_overrun();
        }

        // An unreachable store fails the request even after a successful cache write.
        let result = match (result, self.locks.release_lease(lease).await) {
            (result, Ok(true)) => result,
            (result, Ok(false)) => {
                tracing::warn!(key = %masked, "Lock was no longer held by this attempt at release");
                result
            }
            (Ok(_), Err(e)) => {
                tracing::error!(key = %masked, "Failed to release idempotency lock: {}", e);
                Err(e)
            }
            (Err(original), Err(e)) => {
                tracing::error!(key = %masked, "Failed to release idempotency lock: {}", e);
                Err(original)
            }
        };

        match &result {
            Ok(_) => {
                tracing::info!(key = %masked, "Cached first-attempt response");
                self.finish(GateOutcome::FirstAttempt);
            }
            Err(e) if downstream_failed => {
                tracing::warn!(key = %masked, "Downstream failed, nothing cached: {}", e);
                self.finish(GateOutcome::DownstreamFailed);
            }
            Err(e) => {
                tracing::error!(key = %masked, "Could not complete first attempt: {}", e);
                self.finish(Self::error_outcome(e));
            }
        }

        result
    }

    async fn cache(&self, key: &str, response: &BufferedResponse) -> Result<()> {
        let payload = codec::encode(response).to_json()?;
        self.store
            .set_with_expiry(&self.keys.response_key(key), &payload, self.config.ttl)
            .await
    }

    async fn await_in_flight(&self, key: &str) -> Result<BufferedResponse> {
        let masked = mask_sensitive(key, 4);
        self.stats.record_wait();
        tracing::debug!(key = %masked, "Duplicate in flight, waiting for cached response");

        for attempt in 1..=self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(response) = self.lookup(key).await.map_err(|e| self.fail(e))? {
                get_metrics().record_poll_wait(attempt, true);
                self.finish(GateOutcome::ReplayedAfterWait);
                return Ok(response);
            }
        }

        get_metrics().record_poll_wait(self.config.max_polls, false);
        tracing::info!(key = %masked, "Gave up waiting for in-flight request");
        self.finish(GateOutcome::InProgress);
        Ok(in_progress_response())
    }

    fn error_outcome(error: &AppError) -> GateOutcome {
        if error.is_store_failure() {
            GateOutcome::StoreFailed
        } else {
            GateOutcome::Errored
        }
    }

    /// Records a request that ended on a gate-side error.
    fn fail(&self, error: AppError) -> AppError {
        self.finish(Self::error_outcome(&error));
        error
    }

    fn finish(&self, outcome: GateOutcome) {
        self.stats.record(outcome);
        get_metrics().record_gate_outcome(outcome.as_str());
    }
}
