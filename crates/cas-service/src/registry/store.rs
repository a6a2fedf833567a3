//! Storage backend contract.
//!
//! A [`TicketStore`] is a flat key/value store of serialized tickets. It knows
//! nothing about ticket semantics; the registry layers typing, expiry and
//! cascades on top. Every conditional write is a single atomic backend call so
//! that several nodes can share one store.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Backend name for logs and metrics
    fn name(&self) -> &'static str;

    /// Unconditional write. `ttl_seconds` of `None` means no physical expiry.
    async fn put(&self, id: &str, value: String, ttl_seconds: Option<u64>)
        -> Result<(), StoreError>;

    /// Write only if `id` is absent. Returns whether the write happened.
    async fn put_if_absent(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError>;

    /// Write only if `id` is present. Returns whether the write happened.
    async fn put_if_present(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Remove `id`. Returns true only for the caller that actually removed it.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// Every stored value. Order is unspecified.
    async fn scan_all(&self) -> Result<Vec<String>, StoreError>;

    /// Reachability probe used by readiness checks
    async fn ping(&self) -> Result<(), StoreError>;
}
