//! Ticket registry.
//!
//! The registry is the authoritative collection of live tickets. It layers
//! ticket semantics over a flat [`TicketStore`]:
//!
//! - typed lookups with lazy expiry and parent-chain checks
//! - per-id mutual exclusion through [`TicketLocks`]
//! - a parent -> children index, maintained on insert, for cascading deletes
//! - atomic check-and-consume for single-use tickets
//! - a timeout on every backend call
//!
//! Tickets are stored as JSON inside a [`DistributedCacheObject`] whose TTL is
//! the ticket's remaining lifetime plus a grace period of at least
//! [`TTL_GRACE_SECONDS`], so storage never drops a ticket before the registry
//! sees it expire. Set the grace to the cleaner interval with
//! [`TicketRegistry::with_ttl_grace`]. Entries the backend evicts anyway are
//! pruned from the children index by [`TicketRegistry::clean`].
//!
//! # Locking
//!
//! At most one stripe is held at a time and the children index is never held
//! while waiting on a stripe.

pub mod locks;
pub mod memory;
pub mod redis;
pub mod store;

pub use locks::TicketLocks;
pub use memory::MemoryTicketStore;
pub use redis::RedisTicketStore;
pub use store::{StoreError, TicketStore};

use crate::cache::DistributedCacheObject;
use crate::clock::Clock;
use crate::errors::{CasError, InvalidTicketReason};
use crate::observability::{metrics, ticket_log_id};
use crate::ticket::{Ticket, TicketType};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Minimum seconds added to a ticket's remaining lifetime to form the
/// physical TTL
pub const TTL_GRACE_SECONDS: u64 = 60;

/// Default bound on a single backend call
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Longest parent chain followed (PT -> PGT -> TGT is 2)
const MAX_PARENT_DEPTH: usize = 8;

pub struct TicketRegistry {
    store: Arc<dyn TicketStore>,
    locks: TicketLocks,
    children: RwLock<HashMap<String, HashSet<String>>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    ttl_grace_seconds: u64,
    node_id: Option<String>,
}

impl TicketRegistry {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            store,
            locks: TicketLocks::default(),
            children: RwLock::new(HashMap::new()),
            clock,
            timeout,
            ttl_grace_seconds: TTL_GRACE_SECONDS,
            node_id: None,
        }
    }

    /// Keep tickets physically stored for at least `seconds` past expiry,
    /// never less than [`TTL_GRACE_SECONDS`]
    pub fn with_ttl_grace(mut self, seconds: u64) -> Self {
        self.ttl_grace_seconds = seconds.max(TTL_GRACE_SECONDS);
        self
    }

    /// Stamp stored envelopes with this node's id
    pub fn with_node_id(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id.filter(|n| !n.is_empty());
        self
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one backend call under the registry timeout
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CasError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, fut).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(value)) => {
                metrics::record_registry_operation(operation, "success", elapsed);
                Ok(value)
            }
            Ok(Err(e)) => {
                metrics::record_registry_operation(operation, "error", elapsed);
                warn!(
                    target: "cas.registry",
                    operation = operation,
                    store = self.store.name(),
                    error = %e,
                    "Ticket store call failed"
                );
                Err(CasError::Storage(e.to_string()))
            }
            Err(_) => {
                metrics::record_registry_operation(operation, "timeout", elapsed);
                warn!(
                    target: "cas.registry",
                    operation = operation,
                    store = self.store.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Ticket store call timed out"
                );
                Err(CasError::StorageTimeout { operation })
            }
        }
    }

    fn encode(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<(String, Option<u64>), CasError> {
        let ttl = ticket
            .remaining_lifetime(now)
            .map(|remaining| remaining.saturating_add(self.ttl_grace_seconds));
        let envelope =
            DistributedCacheObject::new(ticket, ttl).published_by(self.node_id.as_deref(), now);
        let value = serde_json::to_string(&envelope).map_err(|e| {
            warn!(target: "cas.registry", error = %e, "Failed to serialize ticket");
            CasError::Internal
        })?;
        Ok((value, ttl))
    }

    fn decode(raw: &str) -> Option<Ticket> {
        match serde_json::from_str::<DistributedCacheObject<Ticket>>(raw) {
            Ok(envelope) => Some(envelope.into_payload()),
            Err(e) => {
                warn!(target: "cas.registry", error = %e, "Skipping undecodable ticket entry");
                None
            }
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Ticket>, CasError> {
        let raw = self.call("get", self.store.get(id)).await?;
        Ok(raw.as_deref().and_then(Self::decode))
    }

    /// Every ancestor must exist and be unexpired
    async fn check_parents(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<(), CasError> {
        let mut next = ticket.parent_id().map(str::to_string);
        let mut depth = 0;

        while let Some(parent_id) = next {
            depth += 1;
            if depth > MAX_PARENT_DEPTH {
                return Err(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid));
            }
            match self.load(&parent_id).await? {
                Some(parent) if !parent.is_expired(now) => {
                    next = parent.parent_id().map(str::to_string);
                }
                _ => return Err(CasError::invalid_ticket(InvalidTicketReason::ParentInvalid)),
            }
        }
        Ok(())
    }

    fn check_type(id: &str, expected: TicketType) -> Result<(), CasError> {
        match TicketType::from_ticket_id(id) {
            Some(t) if t == expected => Ok(()),
            Some(_) => Err(CasError::invalid_ticket(InvalidTicketReason::WrongType)),
            None => Err(CasError::invalid_ticket(InvalidTicketReason::NotFound)),
        }
    }

    async fn forget_child(&self, ticket: &Ticket) {
        if let Some(parent) = ticket.parent_id() {
            let mut children = self.children.write().await;
            if let Some(set) = children.get_mut(parent) {
                set.remove(ticket.id());
                if set.is_empty() {
                    children.remove(parent);
                }
            }
        }
    }

    /// Remove an invalid ticket found at lookup time. Failures are logged;
    /// the cleaner will retry.
    async fn discard(&self, id: &str) {
        if let Err(e) = self.delete_ticket(id).await {
            warn!(
                target: "cas.registry",
                ticket = %ticket_log_id(id),
                error = %e,
                "Failed to discard invalid ticket"
            );
        }
    }

    /// Store a new ticket. Fails with `DuplicateTicket` if the id is taken.
    #[instrument(skip_all, name = "cas.registry.add", fields(ticket = %ticket_log_id(ticket.id())))]
    pub async fn add_ticket(&self, ticket: &Ticket) -> Result<(), CasError> {
        let (value, ttl) = self.encode(ticket, self.clock.now())?;
        let inserted = self
            .call("put_if_absent", self.store.put_if_absent(ticket.id(), value, ttl))
            .await?;
        if !inserted {
            warn!(target: "cas.registry", "Ticket id collision");
            return Err(CasError::DuplicateTicket);
        }

        if let Some(parent) = ticket.parent_id() {
            self.children
                .write()
                .await
                .entry(parent.to_string())
                .or_default()
                .insert(ticket.id().to_string());
        }

        debug!(target: "cas.registry", ttl_seconds = ?ttl, "Added ticket");
        Ok(())
    }

    /// Raw lookup: no type, expiry or parent checks
    pub async fn find_ticket(&self, id: &str) -> Result<Option<Ticket>, CasError> {
        self.load(id).await
    }

    /// Typed lookup of a valid ticket.
    ///
    /// An expired ticket, or one whose granting chain is broken, is deleted
    /// on the way out.
    #[instrument(skip_all, name = "cas.registry.get", fields(ticket = %ticket_log_id(id)))]
    pub async fn get_ticket(&self, id: &str, expected: TicketType) -> Result<Ticket, CasError> {
        Self::check_type(id, expected)?;

        let ticket = self
            .load(id)
            .await?
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::NotFound))?;
        if ticket.ticket_type() != expected {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }

        let now = self.clock.now();
        if ticket.is_expired(now) {
            debug!(target: "cas.registry", "Ticket expired at lookup");
            self.discard(id).await;
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }
        if let Err(e) = self.check_parents(&ticket, now).await {
            if e.invalid_ticket_reason() == Some(InvalidTicketReason::ParentInvalid) {
                debug!(target: "cas.registry", "Ticket orphaned at lookup");
                self.discard(id).await;
            }
            return Err(e);
        }

        Ok(ticket)
    }

    /// Persist a modified ticket. The ticket must still be stored.
    #[instrument(skip_all, name = "cas.registry.update", fields(ticket = %ticket_log_id(ticket.id())))]
    pub async fn update_ticket(&self, ticket: &Ticket) -> Result<(), CasError> {
        let _guard = self.locks.lock(ticket.id()).await;
        let (value, ttl) = self.encode(ticket, self.clock.now())?;
        let updated = self
            .call("put_if_present", self.store.put_if_present(ticket.id(), value, ttl))
            .await?;
        if !updated {
            return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound));
        }
        Ok(())
    }

    /// Locked read-modify-write of a valid ticket.
    ///
    /// `mutate` sees the current stored ticket; its changes are written back
    /// only if it returns `Ok`.
    #[instrument(skip_all, name = "cas.registry.update_with", fields(ticket = %ticket_log_id(id)))]
    pub async fn update_ticket_with<R, F>(
        &self,
        id: &str,
        expected: TicketType,
        mutate: F,
    ) -> Result<R, CasError>
    where
        R: Send,
        F: FnOnce(&mut Ticket) -> Result<R, CasError> + Send,
    {
        Self::check_type(id, expected)?;

        let outcome = {
            let _guard = self.locks.lock(id).await;
            self.update_locked(id, expected, mutate).await
        };

        if matches!(
            outcome.as_ref().err().and_then(CasError::invalid_ticket_reason),
            Some(InvalidTicketReason::Expired | InvalidTicketReason::ParentInvalid)
        ) {
            self.discard(id).await;
        }
        outcome
    }

    async fn update_locked<R, F>(
        &self,
        id: &str,
        expected: TicketType,
        mutate: F,
    ) -> Result<R, CasError>
    where
        R: Send,
        F: FnOnce(&mut Ticket) -> Result<R, CasError> + Send,
    {
        let mut ticket = self
            .load(id)
            .await?
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::NotFound))?;
        if ticket.ticket_type() != expected {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }
        let now = self.clock.now();
        if ticket.is_expired(now) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }
        self.check_parents(&ticket, now).await?;

        let result = mutate(&mut ticket)?;

        let (value, ttl) = self.encode(&ticket, now)?;
        let updated = self
            .call("put_if_present", self.store.put_if_present(id, value, ttl))
            .await?;
        if !updated {
            return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound));
        }
        Ok(result)
    }

    /// Delete a ticket and, transitively, every ticket issued under it.
    ///
    /// Returns how many entries this call removed. Deleting a missing id is
    /// a no-op returning 0.
    #[instrument(skip_all, name = "cas.registry.delete", fields(ticket = %ticket_log_id(id)))]
    pub async fn delete_ticket(&self, id: &str) -> Result<usize, CasError> {
        let mut removed = 0;
        let mut seen = HashSet::new();
        let mut pending = vec![id.to_string()];

        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }

            let ticket = {
                let _guard = self.locks.lock(&current).await;
                let ticket = self.load(&current).await?;
                if self.call("remove", self.store.remove(&current)).await? {
                    removed += 1;
                }
                ticket
            };

            if let Some(children) = self.children.write().await.remove(&current) {
                pending.extend(children);
            }
            if let Some(ticket) = ticket {
                pending.extend(ticket.descendant_ids());
                self.forget_child(&ticket).await;
            }
        }

        if removed > 0 {
            debug!(target: "cas.registry", removed = removed, "Deleted ticket tree");
        }
        Ok(removed)
    }

    /// Validate and record one use of a ticket, atomically.
    ///
    /// If the use exhausts the ticket it is removed from the store; only the
    /// caller whose remove succeeds gets the ticket back, everyone else sees
    /// `NotFound`. This holds across nodes sharing a store.
    #[instrument(skip_all, name = "cas.registry.consume", fields(ticket = %ticket_log_id(id)))]
    pub async fn consume_ticket(&self, id: &str, expected: TicketType) -> Result<Ticket, CasError> {
        Self::check_type(id, expected)?;

        let outcome = {
            let _guard = self.locks.lock(id).await;
            self.consume_locked(id, expected).await
        };

        if outcome.as_ref().err().and_then(CasError::invalid_ticket_reason)
            == Some(InvalidTicketReason::ParentInvalid)
        {
            self.discard(id).await;
        }
        outcome
    }

    async fn consume_locked(&self, id: &str, expected: TicketType) -> Result<Ticket, CasError> {
        let mut ticket = self
            .load(id)
            .await?
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::NotFound))?;
        if ticket.ticket_type() != expected {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }

        let now = self.clock.now();
        if ticket.is_expired(now) {
            self.call("remove", self.store.remove(id)).await?;
            self.forget_child(&ticket).await;
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }
        self.check_parents(&ticket, now).await?;

        if !ticket.update(now) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }

        if ticket.is_expired(now) {
            // Last permitted use
            if !self.call("remove", self.store.remove(id)).await? {
                return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound));
            }
            self.forget_child(&ticket).await;
        } else {
            let (value, ttl) = self.encode(&ticket, now)?;
            if !self
                .call("put_if_present", self.store.put_if_present(id, value, ttl))
                .await?
            {
                return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound));
            }
        }

        debug!(
            target: "cas.registry",
            count_of_uses = ticket.count_of_uses(),
            "Consumed ticket use"
        );
        Ok(ticket)
    }

    /// Remove a ticket and return it if it was still valid (read-once tickets)
    #[instrument(skip_all, name = "cas.registry.take", fields(ticket = %ticket_log_id(id)))]
    pub async fn take_ticket(&self, id: &str, expected: TicketType) -> Result<Ticket, CasError> {
        Self::check_type(id, expected)?;

        let _guard = self.locks.lock(id).await;
        let ticket = self
            .load(id)
            .await?
            .ok_or(CasError::invalid_ticket(InvalidTicketReason::NotFound))?;
        if ticket.ticket_type() != expected {
            return Err(CasError::invalid_ticket(InvalidTicketReason::WrongType));
        }
        if !self.call("remove", self.store.remove(id)).await? {
            return Err(CasError::invalid_ticket(InvalidTicketReason::NotFound));
        }
        self.forget_child(&ticket).await;

        let now = self.clock.now();
        if ticket.is_expired(now) {
            return Err(CasError::invalid_ticket(InvalidTicketReason::Expired));
        }
        self.check_parents(&ticket, now).await?;
        Ok(ticket)
    }

    /// Snapshot of every stored ticket, valid or not
    #[instrument(skip_all, name = "cas.registry.get_tickets")]
    pub async fn get_tickets(&self) -> Result<Vec<Ticket>, CasError> {
        let raw = self.call("scan_all", self.store.scan_all()).await?;
        Ok(raw.iter().filter_map(|value| Self::decode(value)).collect())
    }

    /// Delete every expired or orphaned ticket. Returns the removed count.
    ///
    /// Also drops children index entries whose parent the backend has
    /// already evicted. Safe to run concurrently with foreground traffic and
    /// with other sweeps; a ticket deleted by someone else simply counts as 0.
    #[instrument(skip_all, name = "cas.registry.clean")]
    pub async fn clean(&self) -> Result<usize, CasError> {
        let now = self.clock.now();
        let tickets = self.get_tickets().await?;
        let scanned = tickets.len();
        let present: HashSet<String> = tickets.iter().map(|t| t.id().to_string()).collect();
        let mut removed = 0;

        for ticket in tickets {
            let invalid = if ticket.is_expired(now) {
                true
            } else {
                match self.check_parents(&ticket, now).await {
                    Ok(()) => false,
                    Err(e) if e.invalid_ticket_reason().is_some() => true,
                    Err(e) => return Err(e),
                }
            };
            if invalid {
                removed += self.delete_ticket(ticket.id()).await?;
            }
        }
        removed += self.prune_children_index(&present).await?;

        debug!(
            target: "cas.registry",
            scanned = scanned,
            removed = removed,
            "Registry sweep complete"
        );
        Ok(removed)
    }

    /// Cascade from index entries whose parent was not in the sweep's scan
    /// and is still missing from the store
    async fn prune_children_index(&self, present: &HashSet<String>) -> Result<usize, CasError> {
        let candidates: Vec<String> = self
            .children
            .read()
            .await
            .keys()
            .filter(|parent| !present.contains(*parent))
            .cloned()
            .collect();

        let mut removed = 0;
        for parent in candidates {
            // Added after the scan
            if self.load(&parent).await?.is_some() {
                continue;
            }
            removed += self.delete_ticket(&parent).await?;
        }
        if removed > 0 {
            debug!(target: "cas.registry", removed = removed, "Pruned evicted parents");
        }
        Ok(removed)
    }

    /// Backend reachability
    pub async fn ping(&self) -> Result<(), CasError> {
        self.call("ping", self.store.ping()).await
    }
}
