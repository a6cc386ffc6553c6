//! Backend transport abstraction.
//!
//! The gateway never opens sockets itself: it asks a transport for
//! connections and receives response data through an [`ExchangeSink`].

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use crate::client_pool::DestinationKey;
use crate::error::TransportError;

/// Request line, headers and body relayed to the backend.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Origin-form target: path plus optional query.
    pub path: String,
    /// Headers in the order the client sent them.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

impl RequestHead {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Status and headers of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }
}

/// One body callback from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEvent {
    Data(Bytes),
    Eof,
    Error(TransportError),
}

/// Receives the callbacks of one exchange, in order:
/// `on_headers` once, then any number of `Data`, then `Eof` or `Error`.
///
/// An exchange that fails before headers arrive delivers only `Error`.
pub trait ExchangeSink: Send + 'static {
    fn on_headers(&mut self, head: ResponseHead);
    fn on_body(&mut self, event: BodyEvent);
}

/// A single connection to a destination, able to carry one exchange at a time.
pub trait BackendConnection: Send + 'static {
    /// Start an exchange. Callbacks are delivered on the back loop.
    fn request(&mut self, head: RequestHead, sink: Box<dyn ExchangeSink>) -> Result<(), TransportError>;
}

/// Factory for connections bound to a destination.
pub trait BackendTransport: Send + Sync + 'static {
    /// Construct a connection object. Establishment may be deferred to the
    /// first request.
    fn connect(&self, key: &DestinationKey) -> Result<Box<dyn BackendConnection>, TransportError>;
}
