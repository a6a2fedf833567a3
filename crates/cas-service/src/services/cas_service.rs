//! Central authentication service.
//!
//! Orchestrates the ticket lifecycle on top of the factory, the registry and
//! the authorizer plan:
//!
//! ```text
//! authenticate -> TGT -> grant ST for service -> validate ST -> assertion
//!                                             \-> (pgtUrl) PGT -> PT -> validate PT
//! ```
//!
//! Validation order for an ST or PT:
//!
//! 1. typed lookup (missing / wrong type / expired / orphaned -> `InvalidTicket`)
//! 2. service match; a mismatch burns the ticket
//! 3. `renew` requires a ticket issued from a fresh login; a failure burns it
//! 4. authorizer plan, fail-fast; a denial burns the ticket
//! 5. atomic consume; concurrent validators of one ticket get one success
//! 6. optional PGT issuance for the `pgtUrl` callback service

use crate::authn::Authentication;
use crate::clock::Clock;
use crate::errors::{CasError, InvalidTicketReason};
use crate::observability::{metrics, ticket_log_id, ErrorCategory};
use crate::registry::TicketRegistry;
use crate::ticket::{Ticket, TicketFactory, TicketKind, TicketType};
use crate::validation::{ValidationAuthorizersExecutionPlan, ValidationRequest};
use chrono::{DateTime, Utc};
use common::types::{Principal, Service};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Options presented with a validation request.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Require a ticket issued right after primary authentication
    pub renew: bool,
    /// Issue a PGT for this callback service on success
    pub pgt_url: Option<Service>,
    /// Accept proxy tickets as well as service tickets
    pub allow_proxy_tickets: bool,
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub principal: Principal,
    pub service: Service,
    pub from_new_login: bool,
    pub authentication_date: DateTime<Utc>,
    /// Proxy chain, most recent proxy first; empty for service tickets
    pub proxies: Vec<Service>,
    pub proxy_granting_ticket: Option<String>,
}

pub struct CentralAuthenticationService {
    registry: Arc<TicketRegistry>,
    factory: Arc<TicketFactory>,
    authorizers: Arc<ValidationAuthorizersExecutionPlan>,
    clock: Arc<dyn Clock>,
}

impl CentralAuthenticationService {
    pub fn new(
        registry: Arc<TicketRegistry>,
        factory: Arc<TicketFactory>,
        authorizers: Arc<ValidationAuthorizersExecutionPlan>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            factory,
            authorizers,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<TicketRegistry> {
        &self.registry
    }

    pub fn authorizers(&self) -> &ValidationAuthorizersExecutionPlan {
        &self.authorizers
    }

    /// Mint and store a ticket, retrying once with a fresh id on collision
    async fn store_new<F>(&self, mint: F) -> Result<Ticket, CasError>
    where
        F: Fn() -> Result<Ticket, CasError> + Send + Sync,
    {
        let ticket = mint()?;
        match self.registry.add_ticket(&ticket).await {
            Ok(()) => Ok(ticket),
            Err(CasError::DuplicateTicket) => {
                warn!(target: "cas.service", "Ticket id collision, retrying with a fresh id");
                let ticket = mint()?;
                self.registry.add_ticket(&ticket).await?;
                Ok(ticket)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort delete; failures are left to the cleaner
    async fn burn(&self, ticket_id: &str) {
        if let Err(e) = self.registry.delete_ticket(ticket_id).await {
            warn!(
                target: "cas.service",
                ticket = %ticket_log_id(ticket_id),
                error = %e,
                "Failed to delete ticket"
            );
        }
    }

    /// Start an SSO session
    #[instrument(skip_all, name = "cas.service.create_tgt")]
    pub async fn create_ticket_granting_ticket(
        &self,
        authentication: Authentication,
    ) -> Result<Ticket, CasError> {
        let tgt = self
            .store_new(|| {
                self.factory
                    .create_ticket_granting_ticket(authentication.clone())
            })
            .await?;

        info!(
            target: "cas.service",
            ticket = %ticket_log_id(tgt.id()),
            "Created ticket-granting ticket"
        );
        Ok(tgt)
    }

    /// Issue an ST for `service` under a live TGT.
    ///
    /// The TGT records the grant and counts a use; if that fails the new ST
    /// is removed again. Only the grant that finds the TGT unused under its
    /// lock yields a `from_new_login` ticket.
    #[instrument(skip_all, name = "cas.service.grant_st", fields(tgt = %ticket_log_id(tgt_id)))]
    pub async fn grant_service_ticket(
        &self,
        tgt_id: &str,
        service: &Service,
    ) -> Result<Ticket, CasError> {
        let tgt = self
            .registry
            .get_ticket(tgt_id, TicketType::TicketGranting)
            .await?;
        let mut st = self
            .store_new(|| self.factory.create_service_ticket(&tgt, service.clone()))
            .await?;

        let first_grant = self
            .record_grant_on(tgt_id, TicketType::TicketGranting, &st, service)
            .await?;
        if st.is_from_new_login() != first_grant {
            // Minted from a stale TGT snapshot; the id is not out yet
            st.set_from_new_login(first_grant);
            if let Err(e) = self.registry.update_ticket(&st).await {
                self.burn(st.id()).await;
                return Err(e);
            }
        }

        debug!(
            target: "cas.service",
            ticket = %ticket_log_id(st.id()),
            from_new_login = st.is_from_new_login(),
            "Granted service ticket"
        );
        Ok(st)
    }

    /// Issue a PT for `target_service` under a live PGT
    #[instrument(skip_all, name = "cas.service.grant_pt", fields(pgt = %ticket_log_id(pgt_id)))]
    pub async fn grant_proxy_ticket(
        &self,
        pgt_id: &str,
        target_service: &Service,
    ) -> Result<Ticket, CasError> {
        let pgt = self
            .registry
            .get_ticket(pgt_id, TicketType::ProxyGranting)
            .await?;
        let pt = self
            .store_new(|| self.factory.create_proxy_ticket(&pgt, target_service.clone()))
            .await?;

        self.record_grant_on(pgt_id, TicketType::ProxyGranting, &pt, target_service)
            .await?;

        debug!(
            target: "cas.service",
            ticket = %ticket_log_id(pt.id()),
            "Granted proxy ticket"
        );
        Ok(pt)
    }

    /// Record `granted` on its granting ticket. Returns whether the granting
    /// ticket had never been used before this grant.
    async fn record_grant_on(
        &self,
        granting_id: &str,
        granting_type: TicketType,
        granted: &Ticket,
        service: &Service,
    ) -> Result<bool, CasError> {
        let now = self.clock.now();
        let recorded = self
            .registry
            .update_ticket_with(granting_id, granting_type, |granting| {
                let unused = granting.count_of_uses() == 0;
                granting.record_grant(granted.id(), service);
                granting.update(now);
                Ok(unused)
            })
            .await;

        match recorded {
            Ok(unused) => Ok(unused),
            Err(e) => {
                self.burn(granted.id()).await;
                Err(e)
            }
        }
    }

    /// Issue a PGT after a successful validation.
    ///
    /// The PGT hangs off the validated ticket's granting ticket, which
    /// records it so that logout reaches the proxy chain.
    #[instrument(skip_all, name = "cas.service.grant_pgt")]
    pub async fn grant_proxy_granting_ticket(
        &self,
        validated: &Ticket,
        authentication: &Authentication,
        pgt_url: &Service,
    ) -> Result<Ticket, CasError> {
        let pgt = self
            .store_new(|| {
                self.factory.create_proxy_granting_ticket(
                    validated,
                    authentication.clone(),
                    pgt_url.clone(),
                )
            })
            .await?;

        let parent_id = pgt
            .parent_id()
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid))?;
        let parent_type = TicketType::from_ticket_id(parent_id)
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid))?;

        let recorded = self
            .registry
            .update_ticket_with(parent_id, parent_type, |parent| {
                parent.record_proxy_granting_ticket(pgt.id());
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            self.burn(pgt.id()).await;
            return Err(e);
        }

        Ok(pgt)
    }

    /// Validate an ST (or PT when allowed) presented by `service`
    #[instrument(skip_all, name = "cas.service.validate", fields(ticket = %ticket_log_id(ticket_id)))]
    pub async fn validate_service_ticket(
        &self,
        ticket_id: &str,
        service: &Service,
        options: &ValidationOptions,
    ) -> Result<Assertion, CasError> {
        let result = self.validate(ticket_id, service, options).await;

        match &result {
            Ok(_) => {
                metrics::record_ticket_validation("success", None);
                info!(target: "cas.service", "Ticket validated");
            }
            Err(e) => {
                metrics::record_ticket_validation("error", Some(ErrorCategory::from(e).as_str()));
                debug!(target: "cas.service", error = %e, "Ticket validation failed");
            }
        }
        result
    }

    async fn validate(
        &self,
        ticket_id: &str,
        service: &Service,
        options: &ValidationOptions,
    ) -> Result<Assertion, CasError> {
        let expected = match TicketType::from_ticket_id(ticket_id) {
            Some(TicketType::Service) => TicketType::Service,
            Some(TicketType::Proxy) if options.allow_proxy_tickets => TicketType::Proxy,
            Some(_) => return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType)),
            None => return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound)),
        };

        let snapshot = self.registry.get_ticket(ticket_id, expected).await?;

        if !snapshot.service().is_some_and(|issued| issued.matches(service)) {
            self.burn(ticket_id).await;
            return Err(CasError::invalid_ticket(InvalidTicketReason::ServiceMismatch));
        }

        if options.renew && !snapshot.is_from_new_login() {
            self.burn(ticket_id).await;
            return Err(CasError::invalid_ticket(InvalidTicketReason::NotFromNewLogin));
        }

        let parent_id = snapshot
            .parent_id()
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid))?;
        let parent_type = match expected {
            TicketType::Proxy => TicketType::ProxyGranting,
            _ => TicketType::TicketGranting,
        };
        let parent = self.registry.get_ticket(parent_id, parent_type).await?;
        let authentication = parent.authentication().cloned().ok_or(CasError::Internal)?;
        let proxies = self.proxy_chain(&parent).await?;

        let request = ValidationRequest {
            service,
            ticket_id: snapshot.id(),
            principal: &authentication.principal,
            authentication: &authentication,
        };
        if let Err(denial) = self.authorizers.authorize(&request).await {
            self.burn(ticket_id).await;
            return Err(denial);
        }

        let consumed = self.registry.consume_ticket(ticket_id, expected).await?;

        let proxy_granting_ticket = match &options.pgt_url {
            Some(pgt_url) => {
                match self
                    .grant_proxy_granting_ticket(&consumed, &authentication, pgt_url)
                    .await
                {
                    Ok(pgt) => Some(pgt.id().to_string()),
                    Err(e) => {
                        // The service still gets its assertion, just no PGT
                        warn!(target: "cas.service", error = %e, "Failed to issue proxy-granting ticket");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Assertion {
            principal: authentication.principal.clone(),
            service: service.clone(),
            from_new_login: consumed.is_from_new_login(),
            authentication_date: authentication.authentication_date,
            proxies,
            proxy_granting_ticket,
        })
    }

    /// Services that proxied on behalf of the user, most recent first
    async fn proxy_chain(&self, granting: &Ticket) -> Result<Vec<Service>, CasError> {
        let mut proxies = Vec::new();
        let mut current = granting.clone();

        while let TicketKind::ProxyGranting {
            proxied_by,
            parent_id,
            ..
        } = current.kind()
        {
            proxies.push(proxied_by.clone());
            let parent_id = parent_id.clone();
            let next_type = TicketType::from_ticket_id(&parent_id)
                .ok_or(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid))?;
            current = self.registry.get_ticket(&parent_id, next_type).await?;
        }
        Ok(proxies)
    }

    /// End an SSO session.
    ///
    /// The TGT is marked expired first so every node rejects it even if the
    /// cascade is interrupted. Returns the services that had been granted
    /// tickets, for single-logout notification. Unknown TGTs yield an empty
    /// list.
    #[instrument(skip_all, name = "cas.service.destroy_tgt", fields(tgt = %ticket_log_id(tgt_id)))]
    pub async fn destroy_ticket_granting_ticket(
        &self,
        tgt_id: &str,
    ) -> Result<Vec<Service>, CasError> {
        if TicketType::from_ticket_id(tgt_id) != Some(TicketType::TicketGranting) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }

        let Some(mut tgt) = self.registry.find_ticket(tgt_id).await? else {
            return Ok(Vec::new());
        };
        let services = tgt.granted_services();

        tgt.mark_expired();
        match self.registry.update_ticket(&tgt).await {
            Ok(()) => {}
            // Someone else removed it first
            Err(CasError::InvalidTicket { .. }) => {}
            Err(e) => return Err(e),
        }

        let removed = self.registry.delete_ticket(tgt_id).await?;
        info!(
            target: "cas.service",
            removed = removed,
            services = services.len(),
            "Destroyed ticket-granting ticket"
        );
        Ok(services)
    }

    /// Store a short-lived hand-off ticket
    #[instrument(skip_all, name = "cas.service.create_tst")]
    pub async fn create_transient_session_ticket(
        &self,
        service: Option<Service>,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> Result<Ticket, CasError> {
        self.store_new(|| {
            self.factory
                .create_transient_session_ticket(service.clone(), properties.clone())
        })
        .await
    }

    /// Read a transient session ticket exactly once
    #[instrument(skip_all, name = "cas.service.consume_tst", fields(ticket = %ticket_log_id(ticket_id)))]
    pub async fn consume_transient_session_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Ticket, CasError> {
        self.registry
            .take_ticket(ticket_id, TicketType::TransientSession)
            .await
    }
}
