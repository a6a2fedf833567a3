//! Custom test assertions for expressive tests
//!
//! Assertions panic with a descriptive message on failure.

use cas_service::errors::{CasError, InvalidTicketReason};
use cas_service::ticket::{Ticket, TicketType};
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Assertions on a ticket
///
/// # Example
/// ```rust,ignore
/// st.assert_type(TicketType::Service)
///     .assert_parent(tgt.id())
///     .assert_valid_at(clock.now());
/// ```
pub trait TicketAssertions {
    fn assert_type(&self, expected: TicketType) -> &Self;

    fn assert_parent(&self, parent_id: &str) -> &Self;

    fn assert_valid_at(&self, now: DateTime<Utc>) -> &Self;

    fn assert_expired_at(&self, now: DateTime<Utc>) -> &Self;

    /// Assert the id carries the type prefix and, if given, the node suffix
    fn assert_well_formed_id(&self, node_id: Option<&str>) -> &Self;
}

impl TicketAssertions for Ticket {
    fn assert_type(&self, expected: TicketType) -> &Self {
        assert_eq!(
            self.ticket_type(),
            expected,
            "Expected a {} ticket, got {}",
            expected.as_str(),
            self.ticket_type().as_str()
        );
        self
    }

    fn assert_parent(&self, parent_id: &str) -> &Self {
        assert_eq!(
            self.parent_id(),
            Some(parent_id),
            "Ticket {} is not granted by {}",
            self.id(),
            parent_id
        );
        self
    }

    fn assert_valid_at(&self, now: DateTime<Utc>) -> &Self {
        assert!(
            !self.is_expired(now),
            "Ticket {} should be valid at {}",
            self.id(),
            now
        );
        self
    }

    fn assert_expired_at(&self, now: DateTime<Utc>) -> &Self {
        assert!(
            self.is_expired(now),
            "Ticket {} should be expired at {}",
            self.id(),
            now
        );
        self
    }

    fn assert_well_formed_id(&self, node_id: Option<&str>) -> &Self {
        let prefix = format!("{}-", self.ticket_type().prefix());
        assert!(
            self.id().starts_with(&prefix),
            "Ticket id {} lacks prefix {}",
            self.id(),
            prefix
        );
        assert_eq!(
            TicketType::from_ticket_id(self.id()),
            Some(self.ticket_type()),
            "Ticket id {} does not parse back to its type",
            self.id()
        );
        if let Some(node) = node_id {
            assert!(
                self.id().ends_with(&format!("-{node}")),
                "Ticket id {} lacks node suffix {}",
                self.id(),
                node
            );
        }
        self
    }
}

/// Assertions on service results
pub trait CasResultAssertions {
    /// Assert `Err(InvalidTicket { reason })`
    fn assert_invalid_ticket(&self, reason: InvalidTicketReason);

    /// Assert `Err(UnauthorizedService { code, .. })`
    fn assert_unauthorized(&self, code: &str);

    /// Assert a retryable `StorageTimeout`
    fn assert_storage_timeout(&self);

    /// Assert a retryable `Storage` error
    fn assert_storage_error(&self);
}

impl<T: Debug> CasResultAssertions for Result<T, CasError> {
    fn assert_invalid_ticket(&self, reason: InvalidTicketReason) {
        match self {
            Err(CasError::InvalidTicket { reason: actual }) => assert_eq!(
                *actual, reason,
                "Expected InvalidTicket({reason}), got InvalidTicket({actual})"
            ),
            other => panic!("Expected InvalidTicket({reason}), got {other:?}"),
        }
    }

    fn assert_unauthorized(&self, code: &str) {
        match self {
            Err(CasError::UnauthorizedService { code: actual, .. }) => {
                assert_eq!(actual, code, "Unexpected authorizer denial code");
            }
            other => panic!("Expected UnauthorizedService({code}), got {other:?}"),
        }
    }

    fn assert_storage_timeout(&self) {
        match self {
            Err(e @ CasError::StorageTimeout { .. }) => assert!(e.is_retryable()),
            other => panic!("Expected StorageTimeout, got {other:?}"),
        }
    }

    fn assert_storage_error(&self) {
        match self {
            Err(e @ CasError::Storage(_)) => assert!(e.is_retryable()),
            other => panic!("Expected Storage error, got {other:?}"),
        }
    }
}
