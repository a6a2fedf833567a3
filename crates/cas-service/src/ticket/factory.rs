//! Ticket factory.
//!
//! Mints ids and builds typed tickets with the configured expiration policy
//! for each type. The factory never persists anything; callers hand the
//! result to the registry.

use crate::authn::Authentication;
use crate::clock::Clock;
use crate::errors::{CasError, InvalidTicketReason};
use crate::observability::{metrics, ticket_log_id};
use crate::ticket::expiration::{
    DEFAULT_PT_NUMBER_OF_USES, DEFAULT_PT_TIME_TO_KILL_SECONDS, DEFAULT_ST_NUMBER_OF_USES,
    DEFAULT_ST_TIME_TO_KILL_SECONDS, DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
    DEFAULT_TGT_TIME_TO_IDLE_SECONDS, DEFAULT_TST_TIME_TO_KILL_SECONDS,
};
use crate::ticket::{
    ExpirationPolicy, GrantingState, Ticket, TicketIdGenerator, TicketKind, TicketType,
};
use common::types::Service;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Expiration policy per ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicies {
    pub ticket_granting: ExpirationPolicy,
    pub service: ExpirationPolicy,
    pub proxy_granting: ExpirationPolicy,
    pub proxy: ExpirationPolicy,
    pub transient_session: ExpirationPolicy,
}

impl Default for ExpirationPolicies {
    fn default() -> Self {
        Self {
            ticket_granting: ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds: DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
                time_to_idle_seconds: DEFAULT_TGT_TIME_TO_IDLE_SECONDS,
            },
            service: ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds: DEFAULT_ST_TIME_TO_KILL_SECONDS,
                number_of_uses: DEFAULT_ST_NUMBER_OF_USES,
            },
            proxy_granting: ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds: DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
                time_to_idle_seconds: DEFAULT_TGT_TIME_TO_IDLE_SECONDS,
            },
            proxy: ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds: DEFAULT_PT_TIME_TO_KILL_SECONDS,
                number_of_uses: DEFAULT_PT_NUMBER_OF_USES,
            },
            transient_session: ExpirationPolicy::HardTimeout {
                time_to_kill_seconds: DEFAULT_TST_TIME_TO_KILL_SECONDS,
            },
        }
    }
}

impl ExpirationPolicies {
    pub fn for_type(&self, ticket_type: TicketType) -> ExpirationPolicy {
        match ticket_type {
            TicketType::TicketGranting => self.ticket_granting,
            TicketType::Service => self.service,
            TicketType::ProxyGranting => self.proxy_granting,
            TicketType::Proxy => self.proxy,
            TicketType::TransientSession => self.transient_session,
        }
    }
}

pub struct TicketFactory {
    ids: TicketIdGenerator,
    policies: ExpirationPolicies,
    clock: Arc<dyn Clock>,
}

impl TicketFactory {
    pub fn new(ids: TicketIdGenerator, policies: ExpirationPolicies, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids,
            policies,
            clock,
        }
    }

    pub fn policies(&self) -> &ExpirationPolicies {
        &self.policies
    }

    fn mint(&self, kind: TicketKind) -> Result<Ticket, CasError> {
        let ticket_type = kind.ticket_type();
        let id = self.ids.new_ticket_id(ticket_type)?;
        let ticket = Ticket::new(
            id,
            kind,
            self.policies.for_type(ticket_type),
            self.clock.now(),
        );

        metrics::record_ticket_created(ticket_type.as_str());
        debug!(
            target: "cas.ticket.factory",
            ticket = %ticket_log_id(ticket.id()),
            ticket_type = ticket_type.as_str(),
            "Created ticket"
        );
        Ok(ticket)
    }

    /// Require a live granting ticket of the given type
    fn require_live(&self, ticket: &Ticket, expected: TicketType) -> Result<(), CasError> {
        if ticket.ticket_type() != expected {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }
        if ticket.is_expired(self.clock.now()) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }
        Ok(())
    }

    #[instrument(skip_all, name = "cas.factory.create_tgt")]
    pub fn create_ticket_granting_ticket(
        &self,
        authentication: Authentication,
    ) -> Result<Ticket, CasError> {
        self.mint(TicketKind::TicketGranting {
            state: GrantingState::new(authentication),
        })
    }

    /// Create an ST under `tgt`.
    ///
    /// Does not modify the TGT; recording the grant on the TGT is the
    /// caller's job once the ST has been stored.
    #[instrument(skip_all, name = "cas.factory.create_st")]
    pub fn create_service_ticket(&self, tgt: &Ticket, service: Service) -> Result<Ticket, CasError> {
        self.require_live(tgt, TicketType::TicketGranting)?;

        self.mint(TicketKind::Service {
            service,
            parent_id: tgt.id().to_string(),
            from_new_login: tgt.count_of_uses() == 0,
        })
    }

    /// Create a PGT from a validated ST or PT.
    ///
    /// The PGT hangs off the same granting ticket as the validated ticket, so
    /// destroying the SSO session also destroys the proxy chain.
    #[instrument(skip_all, name = "cas.factory.create_pgt")]
    pub fn create_proxy_granting_ticket(
        &self,
        validated: &Ticket,
        authentication: Authentication,
        proxied_by: Service,
    ) -> Result<Ticket, CasError> {
        if !matches!(
            validated.ticket_type(),
            TicketType::Service | TicketType::Proxy
        ) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }
        let parent_id = validated
            .parent_id()
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid))?;

        self.mint(TicketKind::ProxyGranting {
            state: GrantingState::new(authentication),
            proxied_by,
            parent_id: parent_id.to_string(),
        })
    }

    #[instrument(skip_all, name = "cas.factory.create_pt")]
    pub fn create_proxy_ticket(&self, pgt: &Ticket, service: Service) -> Result<Ticket, CasError> {
        self.require_live(pgt, TicketType::ProxyGranting)?;

        self.mint(TicketKind::Proxy {
            service,
            parent_id: pgt.id().to_string(),
        })
    }

    #[instrument(skip_all, name = "cas.factory.create_tst")]
    pub fn create_transient_session_ticket(
        &self,
        service: Option<Service>,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> Result<Ticket, CasError> {
        self.mint(TicketKind::TransientSession {
            service,
            properties,
        })
    }
}
