//! Observability for the CAS service.
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field
//! allow-listing. Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (ticket types, operations, reasons)
//! - **HASHED**: Must be SHA-256 hashed for correlation (ticket ids, principals)
//! - **NEVER**: Must never appear in logs (passwords, backend URLs)
//!
//! A ticket id is a bearer credential, so logs carry only its type prefix and
//! a truncated hash (see [`ticket_log_id`]).

pub mod metrics;

use crate::errors::CasError;
use crate::ticket::TicketType;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// This is NOT cryptographically secure for secrets; it's a one-way hash
/// for correlation purposes only.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    // 32 bits is enough for correlation
    hex::encode(&result[..4])
}

/// Loggable form of a ticket id: `<PREFIX>:<hash>`
pub fn ticket_log_id(ticket_id: &str) -> String {
    let prefix = TicketType::from_ticket_id(ticket_id)
        .map(|t| t.prefix())
        .unwrap_or("?");
    format!("{}:{}", prefix, hash_for_correlation(ticket_id))
}

/// Error categories for metrics labels (bounded cardinality)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Ticket missing, expired, wrong type or bound to another service
    InvalidTicket,
    /// Credential rejected
    Authentication,
    /// An authorizer denied the request
    Authorization,
    /// Registry backend failed or timed out
    Storage,
    /// Malformed request
    Request,
    /// Everything else
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidTicket => "invalid_ticket",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Request => "request",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&CasError> for ErrorCategory {
    fn from(err: &CasError) -> Self {
        match err {
            CasError::InvalidTicket { .. } => ErrorCategory::InvalidTicket,
            CasError::AuthenticationFailed => ErrorCategory::Authentication,
            CasError::UnauthorizedService { .. } => ErrorCategory::Authorization,
            CasError::Storage(_) | CasError::StorageTimeout { .. } => ErrorCategory::Storage,
            CasError::InvalidRequest(_) => ErrorCategory::Request,
            CasError::DuplicateTicket | CasError::Crypto(_) | CasError::Internal => {
                ErrorCategory::Internal
            }
        }
    }
}
