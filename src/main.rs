use idempotency_gate::api::{business_router, create_router, AppState};
use idempotency_gate::config::{Settings, StoreBackend};
use idempotency_gate::idempotency::{GateConfig, IdempotencyGate, InMemoryStore, KeyValueStore, RedisStore};
use idempotency_gate::observability::{init_logging, init_metrics, LogConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig::from_settings(&settings.application));
    info!("Configuration loaded");

    let gate_config = GateConfig::try_from(&settings.idempotency)?;

    // Connect to the shared store
    let store: Arc<dyn KeyValueStore> = match settings.store.backend {
        StoreBackend::Redis => {
            info!("Connecting to Redis at {}...", settings.store.url);
            let store = RedisStore::open(&settings.store.url)?;
            store.ping().await?;
            info!("Redis connection established");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory idempotency store; duplicates are only detected within this process");
            Arc::new(InMemoryStore::new())
        }
    };

    let gate = Arc::new(IdempotencyGate::new(Arc::clone(&store), gate_config));
    let metrics_handle = init_metrics()?;
    let state = AppState::new(store, gate).with_metrics(metrics_handle);
    let app = create_router(state, business_router());

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
