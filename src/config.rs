use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub idempotency: IdempotencySettings,
    #[serde(default)]
    pub application: ApplicationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub url: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://localhost:6379/0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    pub ttl_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub header_name: String,
    pub key_prefix: String,
    pub hash_keys: bool,
    pub fenced_release: bool,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 60 * 60,
            lock_ttl_seconds: 10,
            poll_interval_ms: 200,
            max_polls: 20,
            header_name: "Idempotency-Key".to_string(),
            key_prefix: "idemp".to_string(),
            hash_keys: false,
            fenced_release: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Loads `config/default`, `config/local`, `APP__*` variables, then `REDIS_URL`.
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("store.url", std::env::var("REDIS_URL").ok())?;

        builder.build()?.try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.store.backend, StoreBackend::Redis);
        assert_eq!(settings.store.url, "redis://localhost:6379/0");
        assert_eq!(settings.idempotency.ttl_seconds, 3600);
        assert_eq!(settings.idempotency.lock_ttl_seconds, 10);
        assert_eq!(settings.idempotency.poll_interval_ms, 200);
        assert_eq!(settings.idempotency.max_polls, 20);
        assert_eq!(settings.idempotency.header_name, "Idempotency-Key");
        assert_eq!(settings.application.port, 8000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [store]
            backend = "memory"

            [idempotency]
            lock_ttl_seconds = 30
            "#,
        )
        .unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.store.url, "redis://localhost:6379/0");
        assert_eq!(settings.idempotency.lock_ttl_seconds, 30);
        assert_eq!(settings.idempotency.ttl_seconds, 3600);
        assert_eq!(settings.application.log_level, "info");
    }

    #[test]
    fn test_environment_overrides_files() {
        std::env::set_var("APP__IDEMPOTENCY__MAX_POLLS", "5");
        std::env::set_var("APP__STORE__BACKEND", "memory");
        let settings = Settings::new().unwrap();
        std::env::remove_var("APP__IDEMPOTENCY__MAX_POLLS");
        std::env::remove_var("APP__STORE__BACKEND");

        assert_eq!(settings.idempotency.max_polls, 5);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
    }
}
