//! HTTP front-end subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, body collection)
//!     → request.rs (request ID)
//!     → RequestDriver (spawned request task)
//!     → response.rs (head handoff, streamed body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{PendingResponse, StreamingResponseWriter};
pub use server::{AppState, GatewayServer};
