//! HTTP routes.
//!
//! Defines the Axum router and the application state it serves.

use crate::authn::{AcceptUsersAuthenticationHandler, AuthenticationHandler};
use crate::clock::Clock;
use crate::config::Config;
use crate::handlers;
use crate::mfa::{MultifactorProviderResolver, StaticMultifactorProvider};
use crate::middleware::http_metrics_middleware;
use crate::observability::metrics::normalize_endpoint;
use crate::registry::{TicketRegistry, TicketStore};
use crate::services::CentralAuthenticationService;
use crate::ticket::{TicketFactory, TicketIdGenerator};
use crate::validation::{
    MultifactorAuthorizer, RegisteredServiceAuthorizer, RequiredAttributesAuthorizer,
    ValidationAuthorizersExecutionPlan,
};
use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Span;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cas: Arc<CentralAuthenticationService>,

    /// Primary authentication for `POST /v1/tickets`
    pub authentication: Arc<dyn AuthenticationHandler>,

    /// Set once shutdown starts; `/ready` then reports 503
    pub draining: Arc<AtomicBool>,
}

impl AppState {
    /// Wire the service graph for `config` over `store`
    pub fn from_config(config: &Config, store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(
            TicketRegistry::new(store, clock.clone(), config.registry_timeout)
                .with_ttl_grace(config.registry_cleaner_interval_seconds)
                .with_node_id(config.node_id.clone()),
        );
        let factory = Arc::new(TicketFactory::new(
            TicketIdGenerator::new(config.ticket_id_entropy_bytes, config.node_id.clone()),
            config.expiration_policies(),
            clock.clone(),
        ));
        let cas = CentralAuthenticationService::new(
            registry,
            factory,
            Arc::new(build_authorizers(config)),
            clock,
        );

        Self {
            cas: Arc::new(cas),
            authentication: Arc::new(AcceptUsersAuthenticationHandler::new(
                config.accept_users.clone(),
            )),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Authorizers in evaluation order: registered service, then multifactor,
/// then required attributes. The last two are only registered when
/// configured.
pub fn build_authorizers(config: &Config) -> ValidationAuthorizersExecutionPlan {
    let mut plan = ValidationAuthorizersExecutionPlan::new();
    plan.register_authorizer(Arc::new(RegisteredServiceAuthorizer::new(
        config.allowed_services.clone(),
    )));

    let mut resolver = MultifactorProviderResolver::new();
    if let Some(attribute) = &config.mfa_principal_attribute {
        resolver = resolver.with_principal_attribute(attribute.clone());
    }
    for (id, order) in &config.mfa_providers {
        resolver.register_provider(Arc::new(StaticMultifactorProvider::new(id.clone(), *order)));
    }
    for rule in &config.required_mfa_services {
        resolver.add_service_rule(rule.clone());
    }
    if !resolver.is_empty() {
        plan.register_authorizer(Arc::new(MultifactorAuthorizer::new(Arc::new(resolver))));
    }

    if !config.required_attributes.is_empty() {
        plan.register_authorizer(Arc::new(RequiredAttributesAuthorizer::new(
            config.required_attributes.clone(),
        )));
    }
    plan
}

/// Request span without the raw URI; paths and queries carry ticket ids
fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http.request",
        method = %request.method(),
        endpoint = normalize_endpoint(request.uri().path()),
    )
}

/// Build the application routes.
///
/// - `POST /v1/tickets`, `POST|DELETE /v1/tickets/{tgt}` - REST tickets
/// - `GET /p3/serviceValidate`, `GET /p3/proxyValidate`, `GET /proxy`
/// - `/health`, `/ready`, `/metrics` - operational, unversioned
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let protocol_routes = Router::new()
        .route("/v1/tickets", post(handlers::create_ticket_granting_ticket))
        .route(
            "/v1/tickets/:tgt",
            post(handlers::create_service_ticket).delete(handlers::destroy_ticket_granting_ticket),
        )
        .route("/p3/serviceValidate", get(handlers::service_validate))
        .route("/p3/proxyValidate", get(handlers::proxy_validate))
        .route("/proxy", get(handlers::proxy))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    protocol_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
