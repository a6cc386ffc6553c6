//! Pooled backend connections and the leases that check them out.
//!
//! # Responsibilities
//! - Represent a single reusable connection to one destination
//! - Track `active` (checked out) and `purge` (broken) flags
//! - Return the handle and its admission permit exactly once per acquire

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedSemaphorePermit;

use crate::backend::{BackendConnection, ExchangeSink, RequestHead};
use crate::client_pool::key::DestinationKey;
use crate::client_pool::pool::ClientPool;
use crate::error::TransportError;

static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One reusable connection to a destination.
pub struct ClientHandle {
    id: u64,
    key: DestinationKey,
    connection: Mutex<Box<dyn BackendConnection>>,
    active: AtomicBool,
    purge: AtomicBool,
}

impl ClientHandle {
    pub(crate) fn new(key: DestinationKey, connection: Box<dyn BackendConnection>) -> Self {
        Self {
            id: HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            key,
            connection: Mutex::new(connection),
            active: AtomicBool::new(false),
            purge: AtomicBool::new(false),
        }
    }

    /// Process-unique id; a replaced slot always gets a new one.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_purged(&self) -> bool {
        self.purge.load(Ordering::Acquire)
    }

    /// Claim the handle if it is idle and healthy.
    pub(crate) fn try_activate(&self) -> bool {
        if self.is_purged() {
            return false;
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // A release with purge may have landed between the two checks.
        if self.is_purged() {
            self.active.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Purge is recorded before `active` clears so a scanner never sees
    /// an idle handle that is about to be marked broken.
    pub(crate) fn deactivate(&self, purge: bool) {
        if purge {
            self.purge.store(true, Ordering::Release);
        }
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn request(
        &self,
        head: RequestHead,
        sink: Box<dyn ExchangeSink>,
    ) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        connection.request(head, sink)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .field("purge", &self.is_purged())
            .finish()
    }
}

/// An acquired handle together with its admission permit.
///
/// Dropping a lease without calling [`ClientLease::release`] still returns
/// the handle; it is purged if an exchange was issued on it.
pub struct ClientLease {
    pool: Arc<ClientPool>,
    handle: Arc<ClientHandle>,
    permit: Option<OwnedSemaphorePermit>,
    issued: bool,
}

impl ClientLease {
    pub(crate) fn new(
        pool: Arc<ClientPool>,
        handle: Arc<ClientHandle>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            handle,
            permit: Some(permit),
            issued: false,
        }
    }

    pub fn handle(&self) -> &Arc<ClientHandle> {
        &self.handle
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// True once a backend exchange has been started on this lease.
    pub fn is_issued(&self) -> bool {
        self.issued
    }

    /// Start a backend exchange on the leased connection.
    pub fn issue(
        &mut self,
        head: RequestHead,
        sink: Box<dyn ExchangeSink>,
    ) -> Result<(), TransportError> {
        self.issued = true;
        self.handle.request(head, sink)
    }

    /// Return the handle to its pool, optionally marking it broken.
    pub fn release(mut self, mark_purge: bool) {
        self.finish(mark_purge);
    }

    fn finish(&mut self, mark_purge: bool) {
        // Taking the permit makes release idempotent.
        let Some(permit) = self.permit.take() else {
            return;
        };

        self.handle.deactivate(mark_purge);
        drop(permit);

        tracing::debug!(
            destination = %self.handle.key(),
            handle_id = self.handle.id(),
            purge = mark_purge,
            "Client returned to pool"
        );
        self.pool.record_release(mark_purge);
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        if self.permit.is_some() {
            tracing::debug!(
                destination = %self.handle.key(),
                handle_id = self.handle.id(),
                issued = self.issued,
                "Client lease dropped without explicit release"
            );
            let purge = self.issued;
            self.finish(purge);
        }
    }
}

impl std::fmt::Debug for ClientLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLease")
            .field("handle", &self.handle)
            .field("issued", &self.issued)
            .field("released", &self.permit.is_none())
            .finish()
    }
}
