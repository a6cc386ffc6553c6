//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request waiting on a backend scope that is still starting:
//!     → backoff.rs (next poll delay, exponential with jitter)
//!     → FrontWaker::wake_after(delay)
//! ```
//!
//! # Design Decisions
//! - No automatic retry of failed exchanges; broken clients are purged and
//!   replaced on the next acquisition instead
//! - Polling never busy-loops

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
