//! In-process ticket store.

use crate::registry::store::{StoreError, TicketStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl_seconds: Option<u64>) -> Self {
        Self {
            value,
            expires_at: ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Tickets held in a map. Physical TTLs are honoured lazily on access.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including physically expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(id.to_string(), Entry::new(value, ttl_seconds));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries.get(id).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(id.to_string(), Entry::new(value, ttl_seconds));
        Ok(true)
    }

    async fn put_if_present(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get_mut(id) {
            Some(entry) if entry.is_live(now) => {
                *entry = Entry::new(value, ttl_seconds);
                Ok(true)
            }
            Some(_) => {
                entries.remove(id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Physically expired: evict
        let mut entries = self.entries.write().await;
        if entries.get(id).is_some_and(|e| !e.is_live(now)) {
            entries.remove(id);
        }
        Ok(None)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(id)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn scan_all(&self) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.is_live(now));
        Ok(entries.values().map(|e| e.value.clone()).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
