//! Process-wide registry of client pools.
//!
//! # Responsibilities
//! - Map destination keys to their pools
//! - Create pools lazily on first use
//! - Bound the number of distinct destinations
//!
//! # Design Decisions
//! - Append-only: pools live until the registry is dropped
//! - Creation is serialized so a key never gets two pools and the
//!   destination bound is exact
//! - Lookups go through a concurrent map and never take the creation lock

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::BackendTransport;
use crate::client_pool::handle::ClientLease;
use crate::client_pool::key::DestinationKey;
use crate::client_pool::pool::ClientPool;
use crate::error::PoolError;

/// Destination key → pool map owned by the application state.
pub struct PoolRegistry {
    pools: DashMap<DestinationKey, Arc<ClientPool>>,
    max_destinations: usize,
    transport: Arc<dyn BackendTransport>,
    creation: Mutex<()>,
}

impl PoolRegistry {
    pub fn new(transport: Arc<dyn BackendTransport>, max_destinations: usize) -> Self {
        Self {
            pools: DashMap::new(),
            max_destinations,
            transport,
            creation: Mutex::new(()),
        }
    }

    /// Look up the pool for a destination, if one has been created.
    pub fn get_pool(&self, key: &DestinationKey) -> Option<Arc<ClientPool>> {
        self.pools.get(key).map(|entry| entry.value().clone())
    }

    /// Create and register the pool for a destination.
    ///
    /// Returns the existing pool if another caller created it first.
    pub fn create_pool(&self, key: &DestinationKey, capacity: usize) -> Result<Arc<ClientPool>, PoolError> {
        let _creating = self.creation.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = self.get_pool(key) {
            return Ok(existing);
        }

        if self.pools.len() >= self.max_destinations {
            tracing::error!(
                destination = %key,
                max_destinations = self.max_destinations,
                "Pool registry at capacity, cannot add destination"
            );
            return Err(PoolError::RegistryFull {
                key: key.clone(),
                capacity: self.max_destinations,
            });
        }

        let pool = ClientPool::new(key.clone(), capacity, self.transport.clone())?;
        self.pools.insert(key.clone(), pool.clone());

        tracing::info!(
            destination = %key,
            capacity,
            destinations = self.pools.len(),
            "Created client pool"
        );
        Ok(pool)
    }

    /// Get or create the destination's pool, then check out a client.
    ///
    /// Blocks while the pool is saturated; see [`ClientPool::acquire`].
    pub fn acquire(&self, key: &DestinationKey, capacity: usize) -> Result<ClientLease, PoolError> {
        let pool = match self.get_pool(key) {
            Some(pool) => pool,
            None => self.create_pool(key, capacity)?,
        };
        pool.acquire()
    }

    /// Return a lease to whichever pool issued it.
    pub fn release(&self, lease: ClientLease, mark_purge: bool) {
        lease.release(mark_purge);
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn destinations(&self) -> Vec<DestinationKey> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Close every admission gate so queued acquirers fail fast.
    pub fn close(&self) {
        for entry in self.pools.iter() {
            entry.value().close();
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("destinations", &self.destinations())
            .field("max_destinations", &self.max_destinations)
            .finish()
    }
}
