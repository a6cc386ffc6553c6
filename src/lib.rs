//! Overlay request-forwarding gateway library.
//!
//! Inbound HTTP requests arrive on the front loop (axum on the main tokio
//! runtime) and are relayed over per-destination pools of backend clients
//! driven by a separate back loop.

pub mod backend;
pub mod bridge;
pub mod client_pool;
pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::{Gateway, Shutdown};
