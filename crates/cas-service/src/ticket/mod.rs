//! Ticket model.
//!
//! Every ticket shares the same usage metadata (id, timestamps, use count,
//! expiration policy) and carries a closed set of type-specific payloads in
//! [`TicketKind`]. Dispatch is on the variant tag; the id prefix mirrors the
//! tag so lookups can be routed before the ticket is loaded.
//!
//! # Invariants
//!
//! - `last_time_used >= creation_time`
//! - `count_of_uses` only grows
//! - once `is_expired` returns true it stays true: `update` is a no-op on an
//!   expired ticket and `mark_expired` is a one-way latch

pub mod expiration;
pub mod factory;
pub mod id;

pub use expiration::{ExpirationPolicy, TicketUsage};
pub use factory::{ExpirationPolicies, TicketFactory};
pub use id::TicketIdGenerator;

use crate::authn::Authentication;
use chrono::{DateTime, Utc};
use common::types::Service;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Ticket type, encoded as the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    TicketGranting,
    Service,
    ProxyGranting,
    Proxy,
    TransientSession,
}

impl TicketType {
    pub const ALL: [TicketType; 5] = [
        TicketType::TicketGranting,
        TicketType::Service,
        TicketType::ProxyGranting,
        TicketType::Proxy,
        TicketType::TransientSession,
    ];

    /// Id prefix (`TGT`, `ST`, ...)
    pub fn prefix(&self) -> &'static str {
        match self {
            TicketType::TicketGranting => "TGT",
            TicketType::Service => "ST",
            TicketType::ProxyGranting => "PGT",
            TicketType::Proxy => "PT",
            TicketType::TransientSession => "TST",
        }
    }

    /// Bounded metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::TicketGranting => "ticket_granting",
            TicketType::Service => "service",
            TicketType::ProxyGranting => "proxy_granting",
            TicketType::Proxy => "proxy",
            TicketType::TransientSession => "transient_session",
        }
    }

    /// Parse the type from a ticket id's prefix
    pub fn from_ticket_id(ticket_id: &str) -> Option<TicketType> {
        let (prefix, rest) = ticket_id.split_once('-')?;
        if rest.is_empty() {
            return None;
        }
        prefix.parse().ok()
    }
}

impl FromStr for TicketType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketType::ALL
            .into_iter()
            .find(|t| t.prefix() == s)
            .ok_or(())
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// State shared by tickets that can grant further tickets (TGT, PGT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantingState {
    pub authentication: Authentication,
    /// Issued service/proxy ticket ids and the service each was issued for
    #[serde(default)]
    pub granted: BTreeMap<String, Service>,
    /// Proxy-granting tickets issued under this ticket
    #[serde(default)]
    pub proxy_granting_tickets: BTreeSet<String>,
}

impl GrantingState {
    pub fn new(authentication: Authentication) -> Self {
        Self {
            authentication,
            granted: BTreeMap::new(),
            proxy_granting_tickets: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketKind {
    TicketGranting {
        state: GrantingState,
    },
    ProxyGranting {
        state: GrantingState,
        proxied_by: Service,
        parent_id: String,
    },
    Service {
        service: Service,
        parent_id: String,
        from_new_login: bool,
    },
    Proxy {
        service: Service,
        parent_id: String,
    },
    TransientSession {
        service: Option<Service>,
        #[serde(default)]
        properties: BTreeMap<String, serde_json::Value>,
    },
}

impl TicketKind {
    pub fn ticket_type(&self) -> TicketType {
        match self {
            TicketKind::TicketGranting { .. } => TicketType::TicketGranting,
            TicketKind::ProxyGranting { .. } => TicketType::ProxyGranting,
            TicketKind::Service { .. } => TicketType::Service,
            TicketKind::Proxy { .. } => TicketType::Proxy,
            TicketKind::TransientSession { .. } => TicketType::TransientSession,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    id: String,
    creation_time: DateTime<Utc>,
    last_time_used: DateTime<Utc>,
    previous_time_used: Option<DateTime<Utc>>,
    count_of_uses: u32,
    expiration_policy: ExpirationPolicy,
    #[serde(default)]
    expired: bool,
    kind: TicketKind,
}

impl Ticket {
    pub fn new(
        id: String,
        kind: TicketKind,
        expiration_policy: ExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creation_time: now,
            last_time_used: now,
            previous_time_used: None,
            count_of_uses: 0,
            expiration_policy,
            expired: false,
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ticket_type(&self) -> TicketType {
        self.kind.ticket_type()
    }

    pub fn kind(&self) -> &TicketKind {
        &self.kind
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn last_time_used(&self) -> DateTime<Utc> {
        self.last_time_used
    }

    pub fn previous_time_used(&self) -> Option<DateTime<Utc>> {
        self.previous_time_used
    }

    pub fn count_of_uses(&self) -> u32 {
        self.count_of_uses
    }

    pub fn expiration_policy(&self) -> &ExpirationPolicy {
        &self.expiration_policy
    }

    pub fn usage(&self) -> TicketUsage {
        TicketUsage {
            creation_time: self.creation_time,
            last_time_used: self.last_time_used,
            count_of_uses: self.count_of_uses,
        }
    }

    /// Whether the ticket is expired at `now`.
    ///
    /// Pure: depends only on stored state and `now`. The granting-ticket
    /// chain is checked by the registry, not here.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired || self.expiration_policy.is_expired(&self.usage(), now)
    }

    /// Record a use. Returns false (and changes nothing) if already expired.
    pub fn update(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        self.previous_time_used = Some(self.last_time_used);
        self.last_time_used = now.max(self.last_time_used);
        self.count_of_uses = self.count_of_uses.saturating_add(1);
        true
    }

    /// Invalidate the ticket regardless of its policy
    pub fn mark_expired(&mut self) {
        self.expired = true;
    }

    /// Seconds until expiry by time alone, `None` if unbounded
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expiration_policy.remaining_lifetime(&self.usage(), now)
    }

    /// Id of the granting ticket this ticket was issued under
    pub fn parent_id(&self) -> Option<&str> {
        match &self.kind {
            TicketKind::ProxyGranting { parent_id, .. }
            | TicketKind::Service { parent_id, .. }
            | TicketKind::Proxy { parent_id, .. } => Some(parent_id),
            TicketKind::TicketGranting { .. } | TicketKind::TransientSession { .. } => None,
        }
    }

    /// Service the ticket was issued for
    pub fn service(&self) -> Option<&Service> {
        match &self.kind {
            TicketKind::Service { service, .. } | TicketKind::Proxy { service, .. } => {
                Some(service)
            }
            TicketKind::TransientSession { service, .. } => service.as_ref(),
            TicketKind::ProxyGranting { proxied_by, .. } => Some(proxied_by),
            TicketKind::TicketGranting { .. } => None,
        }
    }

    fn granting_state(&self) -> Option<&GrantingState> {
        match &self.kind {
            TicketKind::TicketGranting { state } | TicketKind::ProxyGranting { state, .. } => {
                Some(state)
            }
            _ => None,
        }
    }

    fn granting_state_mut(&mut self) -> Option<&mut GrantingState> {
        match &mut self.kind {
            TicketKind::TicketGranting { state } | TicketKind::ProxyGranting { state, .. } => {
                Some(state)
            }
            _ => None,
        }
    }

    /// Authentication carried by a granting ticket
    pub fn authentication(&self) -> Option<&Authentication> {
        self.granting_state().map(|s| &s.authentication)
    }

    /// Whether an ST was issued right after primary authentication
    pub fn is_from_new_login(&self) -> bool {
        matches!(
            self.kind,
            TicketKind::Service {
                from_new_login: true,
                ..
            }
        )
    }

    /// Correct the fresh-login flag of an ST. No-op for other kinds.
    pub fn set_from_new_login(&mut self, value: bool) {
        if let TicketKind::Service { from_new_login, .. } = &mut self.kind {
            *from_new_login = value;
        }
    }

    /// Remember a ticket issued under this granting ticket.
    ///
    /// Returns false if this is not a granting ticket.
    pub fn record_grant(&mut self, ticket_id: &str, service: &Service) -> bool {
        match self.granting_state_mut() {
            Some(state) => {
                state.granted.insert(ticket_id.to_string(), service.clone());
                true
            }
            None => false,
        }
    }

    /// Remember a proxy-granting ticket issued under this granting ticket
    pub fn record_proxy_granting_ticket(&mut self, ticket_id: &str) -> bool {
        match self.granting_state_mut() {
            Some(state) => state.proxy_granting_tickets.insert(ticket_id.to_string()),
            None => false,
        }
    }

    /// Ids this ticket knows it granted; empty for non-granting tickets
    pub fn descendant_ids(&self) -> Vec<String> {
        self.granting_state()
            .map(|s| {
                s.granted
                    .keys()
                    .chain(s.proxy_granting_tickets.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct services that were granted tickets (single-logout targets)
    pub fn granted_services(&self) -> Vec<Service> {
        self.granting_state()
            .map(|s| {
                s.granted
                    .values()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Property of a transient session ticket
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        match &self.kind {
            TicketKind::TransientSession { properties, .. } => properties.get(key),
            _ => None,
        }
    }
}
