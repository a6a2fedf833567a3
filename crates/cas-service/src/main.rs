//! CAS Ticket Server
//!
//! Startup sequence:
//! 1. Initialize tracing
//! 2. Load configuration from the environment
//! 3. Select the ticket store (Redis when `REDIS_URL` is set, else memory)
//! 4. Install the Prometheus recorder
//! 5. Spawn the registry cleaner
//! 6. Serve HTTP until SIGINT/SIGTERM, then drain and cancel background tasks

use cas_service::clock::{Clock, SystemClock};
use cas_service::config::Config;
use cas_service::observability::metrics::init_metrics_recorder;
use cas_service::registry::{MemoryTicketStore, RedisTicketStore, TicketStore};
use cas_service::routes::{self, AppState};
use cas_service::tasks::{start_registry_cleaner, RegistryCleanerConfig};
use common::config::ObservabilityConfig;
use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| observability.log_filter.as_str().into());

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // JSON output is the only setting needed before logging starts
    let json_logs = std::env::var("CAS_JSON_LOGS")
        .is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"));
    init_tracing(&ObservabilityConfig {
        json_logs,
        ..ObservabilityConfig::default()
    });

    info!("Starting CAS ticket server");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        node_id = config.node_id.as_deref().unwrap_or("-"),
        store = if config.redis_url.is_some() { "redis" } else { "memory" },
        cleaner_interval_seconds = config.registry_cleaner_interval_seconds,
        registry_timeout_ms = config.registry_timeout.as_millis() as u64,
        users = config.accept_users.len(),
        "Configuration loaded successfully"
    );
    if config.accept_users.is_empty() {
        warn!("No users configured; every login will be rejected");
    }

    let store: Arc<dyn TicketStore> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis ticket store...");
            let store = RedisTicketStore::connect(url.expose_secret()).await?;
            info!("Redis ticket store connected");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set; tickets are kept in memory and not shared between nodes");
            Arc::new(MemoryTicketStore::new())
        }
    };

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::from_config(&config, store, clock));

    let shutdown_token = CancellationToken::new();

    let cleaner = tokio::spawn(start_registry_cleaner(
        state.cas.registry().clone(),
        RegistryCleanerConfig {
            interval_seconds: config.registry_cleaner_interval_seconds,
        },
        shutdown_token.child_token(),
    ));

    let app = routes::build_routes(state.clone(), metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("CAS ticket server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(
        state.draining.clone(),
        Duration::from_secs(config.drain_seconds),
    ))
    .await?;

    shutdown_token.cancel();
    if let Err(e) = cleaner.await {
        warn!(error = %e, "Registry cleaner task failed");
    }

    info!("CAS ticket server shutdown complete");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then flip readiness and hold for `drain`
async fn shutdown_signal(draining: Arc<AtomicBool>, drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    draining.store(true, Ordering::Relaxed);

    if drain.is_zero() {
        info!("Skipping drain period (CAS_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
