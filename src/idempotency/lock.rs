use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::Result;
use crate::idempotency::key_generator::IdempotencyKeyGenerator;
use crate::idempotency::storage::KeyValueStore;
use crate::observability::mask_sensitive;

/// Ownership of one `lock:` entry.
///
/// A lease dropped without [`LockManager::release_lease`] schedules a background release,
/// so a panicking or cancelled first attempt does not hold the key until the TTL runs out.
pub struct LockLease {
    store: Arc<dyn KeyValueStore>,
    store_key: String,
    token: String,
    fenced: bool,
    acquired_at: Instant,
    released: bool,
}

impl LockLease {
    /// Time since the acquire request was sent, which bounds the store-side TTL from above.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for LockLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockLease")
            .field("store_key", &self.store_key)
            .field("token", &self.token)
            .field("fenced", &self.fenced)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        tracing::warn!(
            lock = %mask_sensitive(&self.store_key, 4),
            "Lock lease dropped without release, releasing in background"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.store_key);
        let token = std::mem::take(&mut self.token);
        let fenced = self.fenced;
        runtime.spawn(async move {
            let result = if fenced {
                store.delete_if_equals(&key, &token).await
            } else {
                store.delete(&key).await
            };
            if let Err(e) = result {
                tracing::error!("Failed to release abandoned lock: {}", e);
            }
        });
    }
}

/// Short-lived mutual exclusion per idempotency key, built on the shared store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    keys: IdempotencyKeyGenerator,
    lock_ttl: Duration,
    fenced: bool,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: IdempotencyKeyGenerator,
        lock_ttl: Duration,
        fenced: bool,
    ) -> Self {
        Self {
            store,
            keys,
            lock_ttl,
            fenced,
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    fn owner_token() -> String {
        format!("{}:{}", Utc::now().timestamp_millis(), Uuid::new_v4())
    }

    /// Tries to take the lock for `idempotency_key` in a single atomic round trip.
    /// Returns `None` when another owner already holds it.
    pub async fn try_acquire(&self, idempotency_key: &str) -> Result<Option<LockLease>> {
        let store_key = self.keys.lock_key(idempotency_key);
        let token = Self::owner_token();
        let acquired_at = Instant::now();

        if !self
            .store
            .set_if_absent(&store_key, &token, self.lock_ttl)
            .await?
        {
            return Ok(None);
        }

        Ok(Some(LockLease {
            store: Arc::clone(&self.store),
            store_key,
            token,
            fenced: self.fenced,
            acquired_at,
            released: false,
        }))
    }

    /// Deletes the lock for `idempotency_key` whoever holds it.
    pub async fn release(&self, idempotency_key: &str) -> Result<()> {
        self.store.delete(&self.keys.lock_key(idempotency_key)).await?;
        Ok(())
    }

    /// Releases a lease. With fencing on, the entry is only removed while it still carries
    /// this lease's token; returns false when the lock had already expired or changed owner.
    pub async fn release_lease(&self, mut lease: LockLease) -> Result<bool> {
        lease.released = true;
        if lease.fenced {
            self.store
                .delete_if_equals(&lease.store_key, &lease.token)
                .await
        } else {
            self.store.delete(&lease.store_key).await
        }
    }
}
