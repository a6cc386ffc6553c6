//! What the driver needs from the front-end server.

use axum::http::{header, HeaderMap, Method, Uri};
use bytes::Bytes;
use std::future::Future;

use crate::backend::{RequestHead, ResponseHead};
use crate::driver::assembler::OutputChain;

/// An inbound request with its body already collected.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(request_id: impl Into<String>, method: Method, uri: Uri) -> Self {
        Self {
            request_id: request_id.into(),
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Host from the `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.host())
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Request line and headers to relay, copied in client order.
    pub fn to_backend_head(&self) -> RequestHead {
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        RequestHead {
            method: self.method.clone(),
            path,
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body: self.body.clone(),
        }
    }
}

/// The client went away; nothing more can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client connection closed")]
pub struct WriterClosed;

/// Response path of the front-end server.
pub trait ResponseWriter: Send {
    /// Transmit status and headers. Called at most once per request.
    fn send_headers(&mut self, head: &ResponseHead) -> Result<(), WriterClosed>;

    /// Transmit a chain of body buffers. Only called while
    /// [`has_capacity`](Self::has_capacity) holds.
    fn send_body(&mut self, chain: OutputChain) -> Result<(), WriterClosed>;

    /// Whether the client side can take another chain right now. While it
    /// cannot, body bytes stay in the assembler.
    fn has_capacity(&self) -> bool;

    /// Resolves once the writer has capacity again, or with an error when
    /// the client side has been torn down.
    fn writable(&mut self) -> impl Future<Output = Result<(), WriterClosed>> + Send + '_;

    /// Signal the end of the response. `clean == false` truncates it so the
    /// client can tell the body is incomplete.
    fn finish(&mut self, clean: bool) -> Result<(), WriterClosed>;

    /// Resolves when the client side has been torn down.
    fn closed(&mut self) -> impl Future<Output = ()> + Send + '_;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn backend_head_keeps_query_and_headers() {
        let mut request = InboundRequest::new("req-1", Method::GET, "/search?q=ziti".parse().unwrap());
        request.headers.append("x-a", HeaderValue::from_static("1"));
        request.headers.append("x-a", HeaderValue::from_static("2"));
        request.headers.append(header::HOST, HeaderValue::from_static("gw.local"));

        let head = request.to_backend_head();
        assert_eq!(head.path, "/search?q=ziti");
        let values: Vec<_> = head
            .headers
            .iter()
            .filter(|(name, _)| name == "x-a")
            .map(|(_, value)| value.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(request.host(), Some("gw.local"));
    }

    #[test]
    fn missing_path_defaults_to_root() {
        let request = InboundRequest::new("req-1", Method::GET, "http://svc-a".parse().unwrap());
        assert_eq!(request.to_backend_head().path, "/");
        assert_eq!(request.host(), Some("svc-a"));
    }
}
