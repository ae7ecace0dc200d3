pub mod codec;
pub mod handler;
pub mod key_generator;
pub mod lock;
pub mod middleware;
pub mod storage;

pub use codec::{BufferedResponse, CachedBody, CachedHeader, CachedResponse};
pub use handler::{
    in_progress_response, GateConfig, GateOutcome, GateStats, IdempotencyGate, StatsSnapshot,
};
pub use key_generator::{IdempotencyKeyGenerator, KeyGeneratorConfig};
pub use lock::{LockLease, LockManager};
pub use middleware::idempotency_middleware;
pub use storage::{InMemoryStore, KeyValueStore, RedisStore};
