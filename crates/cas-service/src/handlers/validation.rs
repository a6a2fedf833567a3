//! CAS protocol validation endpoints.
//!
//! Domain failures (bad ticket, wrong service, denied authorizer) are
//! answered with HTTP 200 and a failure document, as relying parties expect.
//! Retryable storage failures answer 503 so that a client may retry against
//! another node.

use crate::errors::CasError;
use crate::handlers::tickets::record_failure;
use crate::models::{ProxyParams, ServiceResponse, ValidateParams};
use crate::routes::AppState;
use crate::services::ValidationOptions;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use common::types::Service;
use std::sync::Arc;
use tracing::instrument;

type ProtocolResponse = (StatusCode, Json<ServiceResponse>);

fn failure_status(error: &CasError) -> StatusCode {
    if error.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Both parameters present and non-blank
fn required<'a>(
    first: &'a Option<String>,
    second: &'a Option<String>,
) -> Option<(&'a str, &'a str)> {
    let first = first.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    let second = second.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    Some((first, second))
}

async fn validate(
    state: &AppState,
    params: &ValidateParams,
    allow_proxy_tickets: bool,
) -> ProtocolResponse {
    let operation = if allow_proxy_tickets {
        "proxy_validate"
    } else {
        "service_validate"
    };

    let Some((service, ticket)) = required(&params.service, &params.ticket) else {
        let error = record_failure(
            operation,
            CasError::InvalidRequest("Both service and ticket are required".to_string()),
        );
        return (StatusCode::OK, Json(ServiceResponse::authentication_failure(&error)));
    };

    let options = ValidationOptions {
        renew: params.renew(),
        pgt_url: params
            .pgt_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Service::new),
        allow_proxy_tickets,
    };

    match state
        .cas
        .validate_service_ticket(ticket, &Service::new(service), &options)
        .await
    {
        Ok(assertion) => (
            StatusCode::OK,
            Json(ServiceResponse::authentication_success(assertion)),
        ),
        Err(e) => {
            let error = record_failure(operation, e);
            (
                failure_status(&error),
                Json(ServiceResponse::authentication_failure(&error)),
            )
        }
    }
}

/// GET /p3/serviceValidate?service=..&ticket=ST-..[&pgtUrl=..][&renew=true]
#[instrument(skip_all, name = "cas.http.service_validate")]
pub async fn service_validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> ProtocolResponse {
    validate(&state, &params, false).await
}

/// GET /p3/proxyValidate; like serviceValidate but also accepts PTs
#[instrument(skip_all, name = "cas.http.proxy_validate")]
pub async fn proxy_validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> ProtocolResponse {
    validate(&state, &params, true).await
}

/// GET /proxy?pgt=PGT-..&targetService=..
#[instrument(skip_all, name = "cas.http.proxy")]
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProxyParams>,
) -> ProtocolResponse {
    let Some((pgt, target_service)) = required(&params.pgt, &params.target_service) else {
        let error = record_failure(
            "proxy",
            CasError::InvalidRequest("Both pgt and targetService are required".to_string()),
        );
        return (StatusCode::OK, Json(ServiceResponse::proxy_failure(&error)));
    };

    match state
        .cas
        .grant_proxy_ticket(pgt, &Service::new(target_service))
        .await
    {
        Ok(pt) => (
            StatusCode::OK,
            Json(ServiceResponse::proxy_success(pt.id().to_string())),
        ),
        Err(e) => {
            let error = record_failure("proxy", e);
            (
                failure_status(&error),
                Json(ServiceResponse::proxy_failure(&error)),
            )
        }
    }
}
