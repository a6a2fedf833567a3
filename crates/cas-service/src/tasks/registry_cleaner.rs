//! Registry cleaner background task.
//!
//! Lookups already reject expired tickets, so the cleaner only reclaims
//! storage: it sweeps the registry on a fixed cadence and deletes every
//! expired or orphaned ticket, cascading to descendants.
//!
//! Several nodes may sweep the same shared store at once; deletes are
//! idempotent, so overlapping sweeps only disagree on who counted a removal.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered. A sweep in
//! progress runs to completion first.

use crate::config::DEFAULT_CLEANER_INTERVAL_SECONDS;
use crate::observability::metrics;
use crate::registry::TicketRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Configuration for the registry cleaner.
#[derive(Debug, Clone)]
pub struct RegistryCleanerConfig {
    /// Seconds between sweeps. 0 disables the cleaner.
    pub interval_seconds: u64,
}

impl Default for RegistryCleanerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_CLEANER_INTERVAL_SECONDS,
        }
    }
}

impl RegistryCleanerConfig {
    pub fn is_enabled(&self) -> bool {
        self.interval_seconds > 0
    }
}

/// Run the cleaner until `cancel_token` fires.
///
/// Returns immediately when the configured interval is 0.
#[instrument(skip_all, name = "cas.task.registry_cleaner")]
pub async fn start_registry_cleaner(
    registry: Arc<TicketRegistry>,
    config: RegistryCleanerConfig,
    cancel_token: CancellationToken,
) {
    if !config.is_enabled() {
        info!(target: "cas.task.registry_cleaner", "Registry cleaner disabled");
        return;
    }

    info!(
        target: "cas.task.registry_cleaner",
        interval_seconds = config.interval_seconds,
        store = registry.store_name(),
        "Starting registry cleaner"
    );

    let period = Duration::from_secs(config.interval_seconds);
    // First sweep one period after startup, not immediately
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cleanup(&registry).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "cas.task.registry_cleaner",
                    "Registry cleaner received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "cas.task.registry_cleaner", "Registry cleaner stopped");
}

/// One sweep. Failures are logged and retried on the next tick.
pub(crate) async fn run_cleanup(registry: &TicketRegistry) -> usize {
    match registry.clean().await {
        Ok(removed) => {
            metrics::record_registry_cleanup("success", removed);
            if removed > 0 {
                info!(
                    target: "cas.task.registry_cleaner",
                    removed = removed,
                    "Removed expired tickets"
                );
            }
            removed
        }
        Err(e) => {
            metrics::record_registry_cleanup("error", 0);
            error!(
                target: "cas.task.registry_cleaner",
                error = %e,
                "Registry sweep failed"
            );
            0
        }
    }
}
