//! Redis-backed ticket store.
//!
//! # Key Patterns
//!
//! - `cas:ticket:{id}` - serialized ticket envelope (JSON string)
//!
//! Conditional writes map to `SET ... NX` / `SET ... XX`; removal is a single
//! `DEL` whose reply tells exactly one caller it removed the key. Several CAS
//! nodes may share one Redis deployment.
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use concurrently,
//! so each call clones it rather than locking.

use crate::registry::store::{StoreError, TicketStore};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{error, warn};

const KEY_PREFIX: &str = "cas:ticket:";
const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisTicketStore {
    connection: MultiplexedConnection,
}

impl RedisTicketStore {
    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url: it may carry credentials
            error!(target: "cas.registry.redis", error = %e, "Failed to open Redis client");
            StoreError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "cas.registry.redis", error = %e, "Failed to connect to Redis");
                StoreError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { connection })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    async fn set(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
        condition: Option<&'static str>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::key(id)).arg(value);
        if let Some(condition) = condition {
            cmd.arg(condition);
        }
        // EX 0 is rejected by Redis
        if let Some(ttl) = ttl_seconds {
            cmd.arg("EX").arg(ttl.max(1));
        }

        // Conditional SET replies nil when the condition fails
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(command_error)?;
        Ok(reply.is_some())
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    warn!(target: "cas.registry.redis", error = %e, "Redis command failed");
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

#[async_trait]
impl TicketStore for RedisTicketStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        self.set(id, value, ttl_seconds, None).await.map(|_| ())
    }

    async fn put_if_absent(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.set(id, value, ttl_seconds, Some("NX")).await
    }

    async fn put_if_present(
        &self,
        id: &str,
        value: String,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.set(id, value, ttl_seconds, Some("XX")).await
    }

    async fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(Self::key(id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(value)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(Self::key(id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn scan_all(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{KEY_PREFIX}*");
        let mut cursor: u64 = 0;
        let mut values = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;

            if !keys.is_empty() {
                // Keys may vanish between SCAN and MGET
                let batch: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(command_error)?;
                values.extend(batch.into_iter().flatten());
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(values)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }
}
