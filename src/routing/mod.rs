//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route or None
//!
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Parse target into a DestinationKey, create the BackendScope
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Prefix matching only, no regex
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
pub use router::{Route, RouteError, Router};
