//! CAS service error types.
//!
//! Domain errors (`InvalidTicket`, `DuplicateTicket`, `UnauthorizedService`)
//! are kept distinct from infrastructure errors (`Storage`, `StorageTimeout`)
//! so callers can decide whether a retry against another node makes sense.
//! Internal details are logged server-side but never returned to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a ticket was rejected at lookup or validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTicketReason {
    /// No ticket with this id exists (never issued, consumed, or deleted)
    NotFound,
    /// The id belongs to a different ticket type than the one requested
    WrongType,
    /// The ticket's expiration policy reports it expired
    Expired,
    /// The ticket's granting ticket is gone or expired
    ParentInvalid,
    /// The presented service differs from the one the ticket was issued for
    ServiceMismatch,
    /// `renew` was requested but the ticket was not issued from a fresh login
    NotFromNewLogin,
}

impl InvalidTicketReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidTicketReason::NotFound => "not_found",
            InvalidTicketReason::WrongType => "wrong_type",
            InvalidTicketReason::Expired => "expired",
            InvalidTicketReason::ParentInvalid => "parent_invalid",
            InvalidTicketReason::ServiceMismatch => "service_mismatch",
            InvalidTicketReason::NotFromNewLogin => "not_from_new_login",
        }
    }
}

impl fmt::Display for InvalidTicketReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CasError {
    #[error("Invalid ticket: {reason}")]
    InvalidTicket { reason: InvalidTicketReason },

    #[error("Duplicate ticket id")]
    DuplicateTicket,

    #[error("Unauthorized service: {code}: {reason}")]
    UnauthorizedService { code: String, reason: String },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage operation timed out: {operation}")]
    StorageTimeout { operation: &'static str },

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Internal server error")]
    Internal,
}

impl CasError {
    /// Shorthand for an `InvalidTicket` error
    pub fn invalid_ticket(reason: InvalidTicketReason) -> Self {
        CasError::InvalidTicket { reason }
    }

    /// The `InvalidTicket` reason, if this is one
    pub fn invalid_ticket_reason(&self) -> Option<InvalidTicketReason> {
        match self {
            CasError::InvalidTicket { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Whether a caller may retry (possibly against a different node)
    pub fn is_retryable(&self) -> bool {
        matches!(self, CasError::StorageTimeout { .. } | CasError::Storage(_))
    }

    /// CAS protocol failure code for this error
    pub fn protocol_code(&self) -> &'static str {
        match self {
            CasError::InvalidTicket { reason } => match reason {
                InvalidTicketReason::ServiceMismatch => "INVALID_SERVICE",
                _ => "INVALID_TICKET",
            },
            CasError::UnauthorizedService { .. } => "UNAUTHORIZED_SERVICE",
            CasError::InvalidRequest(_) => "INVALID_REQUEST",
            CasError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            CasError::DuplicateTicket
            | CasError::Storage(_)
            | CasError::StorageTimeout { .. }
            | CasError::Crypto(_)
            | CasError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Client-safe description. Never contains ticket ids or backend details.
    pub fn public_message(&self) -> String {
        match self {
            CasError::InvalidTicket { reason } => match reason {
                InvalidTicketReason::NotFound => "Ticket not recognized".to_string(),
                InvalidTicketReason::WrongType => {
                    "Ticket is not valid for this operation".to_string()
                }
                InvalidTicketReason::Expired | InvalidTicketReason::ParentInvalid => {
                    "Ticket has expired".to_string()
                }
                InvalidTicketReason::ServiceMismatch => {
                    "Ticket was not issued for this service".to_string()
                }
                InvalidTicketReason::NotFromNewLogin => {
                    "Ticket was not issued from a new login".to_string()
                }
            },
            CasError::UnauthorizedService { reason, .. } => reason.clone(),
            CasError::InvalidRequest(msg) => msg.clone(),
            CasError::AuthenticationFailed => "Invalid credentials".to_string(),
            CasError::StorageTimeout { .. } => {
                "Ticket registry temporarily unavailable. Please retry.".to_string()
            }
            CasError::DuplicateTicket
            | CasError::Storage(_)
            | CasError::Crypto(_)
            | CasError::Internal => "An internal error occurred".to_string(),
        }
    }

    /// HTTP status used by the REST ticket endpoints
    pub fn status_code(&self) -> StatusCode {
        match self {
            CasError::InvalidTicket { .. } => StatusCode::NOT_FOUND,
            CasError::UnauthorizedService { .. } => StatusCode::FORBIDDEN,
            CasError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            CasError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CasError::StorageTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CasError::DuplicateTicket
            | CasError::Storage(_)
            | CasError::Crypto(_)
            | CasError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for CasError {
    fn into_response(self) -> Response {
        if matches!(self.status_code(), StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(target: "cas.errors", error = %self, "Request failed with internal error");
        }

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.protocol_code().to_string(),
                message: self.public_message(),
            },
        };

        (self.status_code(), Json(error_response)).into_response()
    }
}
