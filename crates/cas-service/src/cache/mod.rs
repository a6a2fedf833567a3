//! Distributed cache envelope.
//!
//! Every value written to a shared store is wrapped in a
//! [`DistributedCacheObject`]: the payload, a free-form property bag used for
//! replication metadata, and the cache-layer time-to-live. The TTL belongs to
//! the cache, not the payload; mutating properties never changes it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Property naming the node that published the object
pub const PROPERTY_PUBLISHER: &str = "publisher";

/// Property holding the publish time (RFC 3339)
pub const PROPERTY_PUBLISHED_AT: &str = "published_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedCacheObject<T> {
    payload: T,
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    time_to_live: Option<u64>,
}

impl<T> DistributedCacheObject<T> {
    pub fn new(payload: T, time_to_live: Option<u64>) -> Self {
        Self {
            payload,
            properties: HashMap::new(),
            time_to_live,
        }
    }

    /// Stamp publisher metadata
    pub fn published_by(mut self, node: Option<&str>, at: DateTime<Utc>) -> Self {
        if let Some(node) = node {
            self.put_property(PROPERTY_PUBLISHER, node);
        }
        self.put_property(PROPERTY_PUBLISHED_AT, at.to_rfc3339());
        self
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn properties(&self) -> &HashMap<String, serde_json::Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        &mut self.properties
    }

    /// Cache-layer TTL in seconds, `None` if the entry never expires
    pub fn time_to_live(&self) -> Option<u64> {
        self.time_to_live
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Typed property lookup. `None` if absent or not convertible to `V`.
    pub fn property<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Insert or replace a property
    pub fn put_property(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.properties.insert(key.into(), value.into());
    }
}

// Identity is the payload; properties and TTL are metadata
impl<T: PartialEq> PartialEq for DistributedCacheObject<T> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl<T: Eq> Eq for DistributedCacheObject<T> {}

impl<T: Hash> Hash for DistributedCacheObject<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}
