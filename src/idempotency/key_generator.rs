use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Configuration for store key generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGeneratorConfig {
    /// Prefix shared by every key the gate writes
    pub key_prefix: String,
    /// Replace client keys by their SHA-256 digest
    pub hash_keys: bool,
}

impl Default for KeyGeneratorConfig {
    fn default() -> Self {
        Self {
            key_prefix: "idemp".to_string(),
            hash_keys: false,
        }
    }
}

/// Maps client idempotency keys onto the `lock:` and `resp:` store namespaces.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    config: KeyGeneratorConfig,
}

impl IdempotencyKeyGenerator {
    pub fn new(config: KeyGeneratorConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(KeyGeneratorConfig::default())
    }

    /// Reads a client key from a header value.
    ///
    /// Empty values count as absent. Every byte is read as one latin-1 character, which
    /// maps distinct header values to distinct keys whether or not they are valid UTF-8.
    pub fn from_header(value: &HeaderValue) -> Option<String> {
        let bytes = value.as_bytes();
        if bytes.is_empty() {
            return None;
        }
        Some(bytes.iter().map(|&b| char::from(b)).collect())
    }

    /// Normalizes a client-provided key for use inside a store key.
    pub fn from_client_key(&self, client_key: &str) -> String {
        if !self.config.hash_keys {
            return client_key.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(client_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Store key of the mutual-exclusion entry.
    pub fn lock_key(&self, client_key: &str) -> String {
        format!("{}:lock:{}", self.config.key_prefix, self.from_client_key(client_key))
    }

    /// Store key of the cached response.
    pub fn response_key(&self, client_key: &str) -> String {
        format!("{}:resp:{}", self.config.key_prefix, self.from_client_key(client_key))
    }
}
