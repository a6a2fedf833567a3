//! Striped per-ticket locks.
//!
//! A fixed table of async mutexes indexed by a hash of the ticket id. Two ids
//! may share a stripe; that only costs some contention. The registry never
//! holds more than one stripe at a time, so stripes cannot deadlock.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_STRIPES: usize = 256;

#[derive(Debug)]
pub struct TicketLocks {
    stripes: Vec<Mutex<()>>,
    hasher: RandomState,
}

impl TicketLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn stripe_for(&self, id: &str) -> usize {
        let len = self.stripes.len() as u64;
        (self.hasher.hash_one(id) % len) as usize
    }

    /// Acquire the stripe guarding `id`
    pub async fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        let index = self.stripe_for(id);
        // index < stripes.len() by construction
        #[allow(clippy::indexing_slicing)]
        self.stripes[index].lock().await
    }
}

impl Default for TicketLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
