//! Per-sender nonce serialization
//!
//! Handles:
//! - Mutual exclusion by sender address around nonce resolution
//! - Local reservation of pool nonces so concurrent requests never share one
//! - Releasing a reservation when its transaction is not accepted

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Hands out one async mutex per sender address
#[derive(Default)]
pub struct AddrLocker {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl AddrLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the given address; the lock is held until the guard is dropped
    pub async fn lock(&self, address: Address) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

/// Tracks the next nonce reserved locally for each sender.
///
/// Callers are expected to hold the sender's `AddrLocker` guard while
/// reserving.
#[derive(Default)]
pub struct NonceTracker {
    next: DashMap<Address, u64>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a nonce for `address`, never lower than the pool nonce
    pub fn reserve(&self, address: Address, pool_nonce: u64) -> u64 {
        let mut next = self.next.entry(address).or_insert(pool_nonce);
        let nonce = (*next).max(pool_nonce);
        *next = nonce + 1;

        debug!("Reserved nonce {} for {:?}", nonce, address);
        nonce
    }

    /// Release a nonce whose transaction was not accepted.
    ///
    /// Only the most recent reservation can be handed back; older ones would
    /// leave a gap behind reservations that are still in flight.
    pub fn release(&self, address: Address, nonce: u64) {
        if let Some(mut next) = self.next.get_mut(&address) {
            if *next == nonce + 1 {
                *next = nonce;
                debug!("Released nonce {} for {:?}", nonce, address);
            }
        }
    }

    /// Next nonce that would be reserved, if any was reserved before
    #[cfg(test)]
    pub fn peek(&self, address: &Address) -> Option<u64> {
        self.next.get(address).map(|n| *n)
    }
}
