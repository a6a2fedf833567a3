//! Builder patterns for test tickets
//!
//! Builds tickets directly, bypassing the factory, so tests can place a
//! ticket with any id, parent, policy or age straight into a registry.

use crate::fixtures::{test_authentication, test_epoch};
use crate::test_ids::*;
use cas_service::authn::Authentication;
use cas_service::ticket::{
    ExpirationPolicies, ExpirationPolicy, GrantingState, Ticket, TicketKind,
};
use chrono::{DateTime, Utc};
use common::types::Service;
use std::collections::BTreeMap;

/// Builder for test tickets
///
/// # Example
/// ```rust,ignore
/// let st = TestTicketBuilder::service(TEST_SERVICE_APP)
///     .with_id("ST-1-custom")
///     .with_parent(TEST_TGT_ID)
///     .created_at(clock.now())
///     .build();
/// ```
pub struct TestTicketBuilder {
    id: String,
    kind: TicketKind,
    policy: ExpirationPolicy,
    created_at: DateTime<Utc>,
    uses: u32,
}

impl TestTicketBuilder {
    fn with_kind(id: &str, kind: TicketKind, policy: ExpirationPolicy) -> Self {
        Self {
            id: id.to_string(),
            kind,
            policy,
            created_at: test_epoch(),
            uses: 0,
        }
    }

    /// A TGT for [`TEST_USER`] with the default TGT policy
    pub fn ticket_granting() -> Self {
        Self::with_kind(
            TEST_TGT_ID,
            TicketKind::TicketGranting {
                state: GrantingState::new(test_authentication(test_epoch())),
            },
            ExpirationPolicies::default().ticket_granting,
        )
    }

    /// A PGT proxied by [`TEST_SERVICE_PROXY`] under [`TEST_TGT_ID`]
    pub fn proxy_granting() -> Self {
        Self::with_kind(
            TEST_PGT_ID,
            TicketKind::ProxyGranting {
                state: GrantingState::new(test_authentication(test_epoch())),
                proxied_by: Service::new(TEST_SERVICE_PROXY),
                parent_id: TEST_TGT_ID.to_string(),
            },
            ExpirationPolicies::default().proxy_granting,
        )
    }

    /// A fresh-login ST for `service` under [`TEST_TGT_ID`]
    pub fn service(service: &str) -> Self {
        Self::with_kind(
            TEST_ST_ID,
            TicketKind::Service {
                service: Service::new(service),
                parent_id: TEST_TGT_ID.to_string(),
                from_new_login: true,
            },
            ExpirationPolicies::default().service,
        )
    }

    /// A PT for `service` under [`TEST_PGT_ID`]
    pub fn proxy(service: &str) -> Self {
        Self::with_kind(
            TEST_PT_ID,
            TicketKind::Proxy {
                service: Service::new(service),
                parent_id: TEST_PGT_ID.to_string(),
            },
            ExpirationPolicies::default().proxy,
        )
    }

    /// A TST with no service and no properties
    pub fn transient_session() -> Self {
        Self::with_kind(
            TEST_TST_ID,
            TicketKind::TransientSession {
                service: None,
                properties: BTreeMap::new(),
            },
            ExpirationPolicies::default().transient_session,
        )
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set the granting ticket; no-op for TGTs and TSTs
    pub fn with_parent(mut self, parent: &str) -> Self {
        match &mut self.kind {
            TicketKind::ProxyGranting { parent_id, .. }
            | TicketKind::Service { parent_id, .. }
            | TicketKind::Proxy { parent_id, .. } => *parent_id = parent.to_string(),
            TicketKind::TicketGranting { .. } | TicketKind::TransientSession { .. } => {}
        }
        self
    }

    /// Replace the authentication of a TGT or PGT
    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        match &mut self.kind {
            TicketKind::TicketGranting { state } | TicketKind::ProxyGranting { state, .. } => {
                state.authentication = authentication;
            }
            _ => {}
        }
        self
    }

    /// Mark an ST as issued from an existing SSO session
    pub fn not_from_new_login(mut self) -> Self {
        if let TicketKind::Service { from_new_login, .. } = &mut self.kind {
            *from_new_login = false;
        }
        self
    }

    /// Add a TST property
    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        if let TicketKind::TransientSession { properties, .. } = &mut self.kind {
            properties.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_policy(mut self, policy: ExpirationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Record `uses` uses at creation time
    pub fn used(mut self, uses: u32) -> Self {
        self.uses = uses;
        self
    }

    pub fn build(self) -> Ticket {
        let mut ticket = Ticket::new(self.id, self.kind, self.policy, self.created_at);
        for _ in 0..self.uses {
            ticket.update(self.created_at);
        }
        ticket
    }
}
