//! HTTP request handlers.
//!
//! - `tickets` - REST ticket issuance and logout
//! - `validation` - CAS protocol validation and proxy endpoints
//! - `health` - Liveness and readiness probes
//! - `metrics` - Prometheus scrape endpoint

pub mod health;
pub mod metrics;
pub mod tickets;
pub mod validation;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use tickets::{
    create_service_ticket, create_ticket_granting_ticket, destroy_ticket_granting_ticket,
};
pub use validation::{proxy, proxy_validate, service_validate};
