//! Fixed-capacity client pool for one destination.
//!
//! # Responsibilities
//! - Pre-populate `capacity` handles on creation
//! - Gate acquisitions with a counting semaphore (backpressure)
//! - Hand out the first idle, healthy handle
//! - Replace handles marked broken before they are reused
//!
//! # Design Decisions
//! - Slots are a fixed array scanned linearly; capacity is tens, not thousands
//! - `acquire` blocks and must run on a worker thread, never on the front loop
//! - A permit is returned exactly once per successful acquire, via the lease

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::backend::BackendTransport;
use crate::client_pool::handle::{ClientHandle, ClientLease};
use crate::client_pool::key::DestinationKey;
use crate::error::PoolError;
use crate::observability::metrics;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub active: usize,
    pub purged: usize,
    pub available_permits: usize,
    pub replaced_total: u64,
}

/// Bounded set of reusable connections to one destination.
pub struct ClientPool {
    key: DestinationKey,
    capacity: usize,
    slots: Mutex<Vec<Arc<ClientHandle>>>,
    gate: Arc<Semaphore>,
    transport: Arc<dyn BackendTransport>,
    replaced_total: AtomicU64,
}

impl ClientPool {
    /// Create a pool and pre-populate every slot with a fresh connection.
    pub fn new(
        key: DestinationKey,
        capacity: usize,
        transport: Arc<dyn BackendTransport>,
    ) -> Result<Arc<Self>, PoolError> {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let connection = transport.connect(&key)?;
            slots.push(Arc::new(ClientHandle::new(key.clone(), connection)));
        }

        tracing::debug!(destination = %key, capacity, "Client pool populated");

        Ok(Arc::new(Self {
            key,
            capacity,
            slots: Mutex::new(slots),
            gate: Arc::new(Semaphore::new(capacity)),
            transport,
            replaced_total: AtomicU64::new(0),
        }))
    }

    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check out a handle, waiting on the admission gate if every handle is busy.
    ///
    /// Blocks the calling thread. Call it from a runtime worker thread
    /// (e.g. inside `spawn_blocking`), never from async code.
    pub fn acquire(self: &Arc<Self>) -> Result<ClientLease, PoolError> {
        let permit = self.wait_for_permit()?;

        self.replace_purged();
        if let Some(handle) = self.claim() {
            return Ok(self.lease(handle, permit));
        }

        tracing::debug!(destination = %self.key, "No idle client after admission, replacing purged slots");
        self.replace_purged();
        if let Some(handle) = self.claim() {
            return Ok(self.lease(handle, permit));
        }

        // Holding a permit guarantees a non-active slot; only purged slots
        // that could not be replaced end up here.
        tracing::error!(
            destination = %self.key,
            stats = ?self.stats(),
            "Client pool invariant violated: admitted but no usable client"
        );
        drop(permit);
        Err(PoolError::Exhausted(self.key.clone()))
    }

    /// Return a lease to this pool.
    pub fn release(&self, lease: ClientLease, mark_purge: bool) {
        debug_assert!(std::ptr::eq(Arc::as_ptr(lease.pool()), self));
        lease.release(mark_purge);
    }

    /// Swap every idle, purged handle for a freshly constructed one.
    ///
    /// Returns the number of slots replaced. A slot whose replacement
    /// cannot be constructed stays purged.
    pub fn replace_purged(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut replaced = 0;

        for (index, slot) in slots.iter_mut().enumerate() {
            if !slot.is_purged() || slot.is_active() {
                continue;
            }
            match self.transport.connect(&self.key) {
                Ok(connection) => {
                    let fresh = Arc::new(ClientHandle::new(self.key.clone(), connection));
                    tracing::debug!(
                        destination = %self.key,
                        slot = index,
                        old_handle = slot.id(),
                        new_handle = fresh.id(),
                        "Replaced purged client"
                    );
                    *slot = fresh;
                    replaced += 1;
                }
                Err(e) => {
                    tracing::warn!(destination = %self.key, slot = index, error = %e, "Failed to replace purged client");
                }
            }
        }

        if replaced > 0 {
            self.replaced_total.fetch_add(replaced as u64, Ordering::Relaxed);
            metrics::record_replacements(&self.key, replaced);
        }
        replaced
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        PoolStats {
            capacity: self.capacity,
            active: slots.iter().filter(|h| h.is_active()).count(),
            purged: slots.iter().filter(|h| h.is_purged()).count(),
            available_permits: self.gate.available_permits(),
            replaced_total: self.replaced_total.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the handles currently occupying the slots.
    pub fn handles(&self) -> Vec<Arc<ClientHandle>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Close the admission gate; queued and future acquirers fail.
    pub fn close(&self) {
        self.gate.close();
    }

    pub(crate) fn record_release(&self, purged: bool) {
        let active = self.capacity.saturating_sub(self.gate.available_permits());
        metrics::record_pool_active(&self.key, active);
        if purged {
            tracing::debug!(destination = %self.key, "Client marked for replacement");
        }
    }

    fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        match self.gate.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::GateClosed(self.key.clone())),
            Err(TryAcquireError::NoPermits) => {}
        }

        tracing::debug!(
            destination = %self.key,
            capacity = self.capacity,
            "All clients in use; queueing until one is returned"
        );

        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        runtime
            .block_on(self.gate.clone().acquire_owned())
            .map_err(|_| PoolError::GateClosed(self.key.clone()))
    }

    fn claim(&self) -> Option<Arc<ClientHandle>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().find(|h| h.try_activate()).cloned()
    }

    fn lease(self: &Arc<Self>, handle: Arc<ClientHandle>, permit: OwnedSemaphorePermit) -> ClientLease {
        tracing::debug!(destination = %self.key, handle_id = handle.id(), "Client acquired");
        let active = self.capacity.saturating_sub(self.gate.available_permits());
        metrics::record_pool_active(&self.key, active);
        ClientLease::new(self.clone(), handle, permit)
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("key", &self.key)
            .field("stats", &self.stats())
            .finish()
    }
}
