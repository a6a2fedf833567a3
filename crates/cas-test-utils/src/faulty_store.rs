//! Fault-injecting ticket store
//!
//! Wraps a [`MemoryTicketStore`] and, depending on its current mode, delays
//! or fails every call. The mode can be flipped mid-test to simulate a
//! backend that degrades or recovers under traffic. Independently of the
//! mode, the next few inserts can be made to report an id collision.

use async_trait::async_trait;
use cas_service::registry::{MemoryTicketStore, StoreError, TicketStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Pass every call through
    Healthy,
    /// Sleep before passing the call through
    Slow(Duration),
    /// Fail every call as if the backend were unreachable
    Unavailable,
    /// Fail every call with a command error
    Rejecting,
}

pub struct FaultyStore {
    inner: MemoryTicketStore,
    mode: Mutex<FaultMode>,
    calls: AtomicUsize,
    pending_collisions: AtomicUsize,
    insert_attempts: AtomicUsize,
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new(FaultMode::Healthy)
    }
}

impl FaultyStore {
    pub fn new(mode: FaultMode) -> Self {
        Self {
            inner: MemoryTicketStore::new(),
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
            pending_collisions: AtomicUsize::new(0),
            insert_attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: FaultMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn mode(&self) -> FaultMode {
        *self.mode.lock().unwrap()
    }

    /// Total calls seen, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` inserts report that the id is already taken
    pub fn collide_next_inserts(&self, count: usize) {
        self.pending_collisions.store(count, Ordering::SeqCst);
    }

    /// Total `put_if_absent` calls seen
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn take_collision(&self) -> bool {
        self.pending_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// The healthy store underneath, for inspecting state
    pub fn inner(&self) -> &MemoryTicketStore {
        &self.inner
    }

    async fn inject(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode() {
            FaultMode::Healthy => Ok(()),
            FaultMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            FaultMode::Unavailable => Err(StoreError::Unavailable(
                "injected: connection refused".to_string(),
            )),
            FaultMode::Rejecting => Err(StoreError::Command("injected: command rejected".to_string())),
        }
    }
}

#[async_trait]
impl TicketStore for FaultyStore {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn put(&self, id: &str, value: String, ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        self.inject().await?;
        self.inner.put(id, value, ttl_seconds).await
    }

    async fn put_if_absent(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.inject().await?;
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_collision() {
            return Ok(false);
        }
        self.inner.put_if_absent(id, value, ttl_seconds).await
    }

    async fn put_if_present(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.inject().await?;
        self.inner.put_if_present(id, value, ttl_seconds).await
    }

    async fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.inject().await?;
        self.inner.get(id).await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.inject().await?;
        self.inner.remove(id).await
    }

    async fn scan_all(&self) -> Result<Vec<String>, StoreError> {
        self.inject().await?;
        self.inner.scan_all().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inject().await?;
        self.inner.ping().await
    }
}
