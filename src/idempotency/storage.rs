use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Shared key-value store used to coordinate replicas.
///
/// Every operation is a single round trip with no multi-key transaction.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes `value` only if `key` does not exist yet.
    /// Returns true if the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns true if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes `key` only while it still holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

fn ttl_ms(ttl: Duration) -> u64 {
    let ms = ttl.as_millis() as u64;
    if ms == 0 {
        1
    } else {
        ms
    }
}

/// Redis-backed store shared by all replicas.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(AppError::Redis)?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)
    }

    fn observe<T>(operation: &str, timer: LatencyTimer, result: &Result<T>) {
        get_metrics().record_store_operation(operation, timer.elapsed_ms(), result.is_ok());
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let timer = LatencyTimer::new();
        let result: Result<bool> = async {
            let mut conn = self.connection().await?;
            let written: Option<String> = conn
                .set_options(
                    key,
                    value,
                    redis::SetOptions::default()
                        .conditional_set(redis::ExistenceCheck::NX)
                        .with_expiration(redis::SetExpiry::PX(ttl_ms(ttl) as usize)),
                )
                .await
                .map_err(AppError::Redis)?;
            Ok(written.is_some())
        }
        .await;
        Self::observe("set_if_absent", timer, &result);
        result
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let timer = LatencyTimer::new();
        let result: Result<Option<String>> = async {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn.get(key).await.map_err(AppError::Redis)?;
            Ok(value)
        }
        .await;
        Self::observe("get", timer, &result);
        result
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let timer = LatencyTimer::new();
        let result: Result<()> = async {
            let mut conn = self.connection().await?;
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms(ttl))
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(AppError::Redis)
        }
        .await;
        Self::observe("set_with_expiry", timer, &result);
        result
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let timer = LatencyTimer::new();
        let result: Result<bool> = async {
            let mut conn = self.connection().await?;
            let deleted: i64 = conn.del(key).await.map_err(AppError::Redis)?;
            Ok(deleted > 0)
        }
        .await;
        Self::observe("delete", timer, &result);
        result
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let timer = LatencyTimer::new();
        let result: Result<bool> = async {
            let mut conn = self.connection().await?;
            let deleted: i64 = redis::Script::new(COMPARE_AND_DELETE)
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(AppError::Redis)?;
            Ok(deleted > 0)
        }
        .await;
        Self::observe("delete_if_equals", timer, &result);
        result
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(AppError::Redis)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local store for single-replica development and tests.
///
/// Expired entries are swept on every access rather than by a background task.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, MemoryEntry>) -> T) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Store("in-memory store lock poisoned".to_string()))?;
        let now = Instant::now();
        guard.retain(|_, entry| entry.expires_at > now);
        Ok(f(&mut guard))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.with_entries(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.with_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            true
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries| entries.remove(key).is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        self.with_entries(|entries| match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                true
            }
            _ => false,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.with_entries(|_| ())
    }
}
