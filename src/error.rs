//! Gateway-wide error types.
//!
//! Each subsystem owns a narrow error enum; `GatewayError` is what the
//! request driver turns into a client-facing status.

use axum::http::StatusCode;
use thiserror::Error;

use crate::client_pool::DestinationKey;

/// Errors raised by the client pools and the pool registry.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The registry already holds `max_destinations` pools.
    #[error("pool registry at capacity ({capacity} destinations), cannot add {key}")]
    RegistryFull { key: DestinationKey, capacity: usize },

    /// No usable handle after a replace-and-rescan cycle.
    #[error("no usable client for {0} after replacing purged handles")]
    Exhausted(DestinationKey),

    /// The admission gate was closed.
    #[error("admission gate for {0} closed")]
    GateClosed(DestinationKey),

    /// Blocking acquisition attempted outside a runtime worker.
    #[error("client acquisition requires a runtime worker thread")]
    NoRuntime,

    /// A replacement connection could not be constructed.
    #[error("failed to construct connection: {0}")]
    Connect(#[from] TransportError),
}

/// Errors raised by the cross-loop bridge.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// Every worker slot is busy.
    #[error("worker pool saturated ({0} jobs in flight)")]
    Saturated(usize),

    /// The bridge has been closed.
    #[error("worker pool shutting down")]
    ShuttingDown,
}

/// Errors raised by a backend transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The destination key could not be turned into an address.
    #[error("invalid destination {0}")]
    InvalidDestination(String),

    /// Connection establishment failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Connection establishment timed out.
    #[error("connect timed out after {0} seconds")]
    ConnectTimeout(u64),

    /// The exchange failed after it was issued.
    #[error("exchange failed: {0}")]
    Exchange(String),

    /// The connection already carries an exchange or has been closed.
    #[error("connection unavailable: {0}")]
    Unavailable(String),
}

/// Errors that end a request with an error response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {0}")]
    NoRoute(String),

    #[error("backend scope {0} failed to initialize")]
    ScopeFailed(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    /// Status code reported to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::ScopeFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Pool(_) | GatewayError::Bridge(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
