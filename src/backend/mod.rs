//! Backend transport subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     back_loop.rs (spawn loop thread)
//!     → scope.rs (per-route handshake: Init → LoopStarted → InitStarted → InitCompleted)
//!
//! Per exchange (on the back loop):
//!     transport.rs (BackendConnection::request)
//!     → http_transport.rs (dial if needed, send, stream frames)
//!     → ExchangeSink callbacks: on_headers, on_body(Data | Eof | Error)
//! ```
//!
//! # Design Decisions
//! - The transport is a trait so the gateway core is testable without sockets
//! - Backend I/O never runs on the front loop

pub mod back_loop;
pub mod http_transport;
pub mod scope;
pub mod transport;

pub use back_loop::BackLoop;
pub use http_transport::HttpTransport;
pub use scope::{BackendScope, ScopeState};
pub use transport::{
    BackendConnection, BackendTransport, BodyEvent, ExchangeSink, RequestHead, ResponseHead,
};
