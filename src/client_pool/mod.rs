//! Backend client pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Request needs a backend connection (on a worker thread)
//!     → registry.rs (find or lazily create the destination's pool)
//!     → pool.rs (wait on admission gate, replace purged, scan slots)
//!     → handle.rs (ClientLease: handle + permit)
//!     → ... backend exchange ...
//!     → lease.release(purge) → slot idle again, permit returned
//! ```
//!
//! # Design Decisions
//! - One pool per destination key, fixed capacity, no whole-pool eviction
//! - Broken connections are flagged and replaced lazily by the next acquirer
//! - The registry is an explicit value injected where needed, not a global

pub mod handle;
pub mod key;
pub mod pool;
pub mod registry;

pub use handle::{ClientHandle, ClientLease};
pub use key::DestinationKey;
pub use pool::{ClientPool, PoolStats};
pub use registry::PoolRegistry;
