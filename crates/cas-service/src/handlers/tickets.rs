//! REST ticket endpoints.
//!
//! `POST /v1/tickets` trades credentials for a TGT, `POST /v1/tickets/{tgt}`
//! trades a TGT for a service ticket, `DELETE /v1/tickets/{tgt}` logs out.

use crate::authn::{Authentication, Credential};
use crate::clock::Clock;
use crate::errors::CasError;
use crate::models::{
    LogoutResponse, ServiceTicketRequest, ServiceTicketResponse, TicketGrantingTicketResponse,
};
use crate::observability::{metrics, ErrorCategory};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use common::types::Service;
use std::sync::Arc;
use tracing::instrument;

/// Count a failed request before it becomes a response
pub(crate) fn record_failure(operation: &'static str, error: CasError) -> CasError {
    metrics::record_error(
        operation,
        ErrorCategory::from(&error).as_str(),
        error.status_code().as_u16(),
    );
    error
}

/// POST /v1/tickets
///
/// Form fields `username`, `password`. Responds 201 with the TGT id in the
/// body and in `Location`.
#[instrument(skip_all, name = "cas.http.create_tgt")]
pub async fn create_ticket_granting_ticket(
    State(state): State<Arc<AppState>>,
    Form(credential): Form<Credential>,
) -> Result<impl IntoResponse, CasError> {
    let principal = state
        .authentication
        .authenticate(&credential)
        .await
        .map_err(|e| record_failure("create_tgt", e))?;

    let mut authentication = Authentication::new(principal, state.cas.registry().clock().now());
    authentication
        .successful_handlers
        .push(state.authentication.name().to_string());

    let tgt = state
        .cas
        .create_ticket_granting_ticket(authentication)
        .await
        .map_err(|e| record_failure("create_tgt", e))?;

    let location = format!("/v1/tickets/{}", tgt.id());
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(TicketGrantingTicketResponse {
            ticket: tgt.id().to_string(),
        }),
    ))
}

/// POST /v1/tickets/{tgt}
///
/// Form field `service`.
#[instrument(skip_all, name = "cas.http.create_st")]
pub async fn create_service_ticket(
    State(state): State<Arc<AppState>>,
    Path(tgt_id): Path<String>,
    Form(request): Form<ServiceTicketRequest>,
) -> Result<Json<ServiceTicketResponse>, CasError> {
    if request.service.trim().is_empty() {
        return Err(record_failure(
            "grant_st",
            CasError::InvalidRequest("Missing service".to_string()),
        ));
    }
    let service = Service::new(request.service.trim());

    let st = state
        .cas
        .grant_service_ticket(&tgt_id, &service)
        .await
        .map_err(|e| record_failure("grant_st", e))?;

    Ok(Json(ServiceTicketResponse {
        ticket: st.id().to_string(),
        service: service.id().to_string(),
    }))
}

/// DELETE /v1/tickets/{tgt}
///
/// Unknown sessions log out successfully with no services.
#[instrument(skip_all, name = "cas.http.destroy_tgt")]
pub async fn destroy_ticket_granting_ticket(
    State(state): State<Arc<AppState>>,
    Path(tgt_id): Path<String>,
) -> Result<Json<LogoutResponse>, CasError> {
    let services = state
        .cas
        .destroy_ticket_granting_ticket(&tgt_id)
        .await
        .map_err(|e| record_failure("destroy_tgt", e))?;

    Ok(Json(LogoutResponse {
        services: services.iter().map(|s| s.id().to_string()).collect(),
    }))
}
