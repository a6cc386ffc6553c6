//! Request lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → request_driver.rs (route, wait for scope, acquire via bridge)
//!     → lease.issue(head, ExchangeRelay)          [back loop]
//!     → relay pushes body into assembler.rs, posts wakes
//!     → request_driver.rs drains assembler into the ResponseWriter
//!     → Done: finish writer, release lease (purge on failure / 5xx)
//! ```
//!
//! # Design Decisions
//! - `drive` is synchronous and never blocks; every wait is a `Suspend`
//! - State only moves forward; `BodyChunkReady` may repeat
//! - The context owns the lease, so dropping a request always releases it

pub mod assembler;
pub mod context;
pub mod front;
pub mod request_driver;
pub mod state;

pub use assembler::{OutputChain, ResponseBufferAssembler};
pub use context::{ExchangeRelay, RequestContext};
pub use front::{InboundRequest, ResponseWriter, WriterClosed};
pub use request_driver::{DriverSettings, RequestDriver};
pub use state::{RequestState, Step, StreamEnd};
