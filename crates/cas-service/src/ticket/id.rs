//! Ticket id generation.
//!
//! Ids have the form `<PREFIX>-<counter>-<random>[-<node>]`:
//!
//! - `PREFIX` identifies the ticket type (`TGT`, `ST`, ...)
//! - `counter` is a per-process sequence, useful when reading logs
//! - `random` is CSPRNG output (base64url, no padding); this is what makes
//!   ids unique across nodes without coordination
//! - `node` optionally names the issuing node

use crate::errors::CasError;
use crate::ticket::TicketType;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimum random bytes per id (128 bits)
pub const MIN_ENTROPY_BYTES: usize = 16;

/// Default random bytes per id (256 bits)
pub const DEFAULT_ENTROPY_BYTES: usize = 32;

pub struct TicketIdGenerator {
    counter: AtomicU64,
    entropy_bytes: usize,
    node_suffix: Option<String>,
    rng: SystemRandom,
}

impl TicketIdGenerator {
    /// Create a generator. `entropy_bytes` below [`MIN_ENTROPY_BYTES`] is raised
    /// to the minimum.
    pub fn new(entropy_bytes: usize, node_suffix: Option<String>) -> Self {
        Self {
            counter: AtomicU64::new(1),
            entropy_bytes: entropy_bytes.max(MIN_ENTROPY_BYTES),
            node_suffix: node_suffix.filter(|s| !s.is_empty()),
            rng: SystemRandom::new(),
        }
    }

    pub fn entropy_bytes(&self) -> usize {
        self.entropy_bytes
    }

    pub fn new_ticket_id(&self, ticket_type: TicketType) -> Result<String, CasError> {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut random = vec![0u8; self.entropy_bytes];
        self.rng
            .fill(&mut random)
            .map_err(|e| CasError::Crypto(format!("Ticket id generation failed: {}", e)))?;

        let mut id = format!(
            "{}-{}-{}",
            ticket_type.prefix(),
            sequence,
            URL_SAFE_NO_PAD.encode(&random)
        );
        if let Some(node) = &self.node_suffix {
            id.push('-');
            id.push_str(node);
        }
        Ok(id)
    }
}

impl std::fmt::Debug for TicketIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketIdGenerator")
            .field("entropy_bytes", &self.entropy_bytes)
            .field("node_suffix", &self.node_suffix)
            .finish()
    }
}
