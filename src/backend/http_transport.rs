//! HTTP/1.1 backend transport over TCP.
//!
//! # Responsibilities
//! - Dial the destination on the back loop, lazily on first use
//! - Keep one dedicated hyper connection per pooled handle
//! - Relay response head and body frames to the exchange sink
//!
//! # Design Decisions
//! - Every exchange runs as a task on the back-loop runtime
//! - A connection the server closed is re-dialed on the next exchange;
//!   a connection whose exchange failed is left to the pool to purge

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use futures_util::StreamExt;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::backend::transport::{
    BackendConnection, BackendTransport, BodyEvent, ExchangeSink, RequestHead, ResponseHead,
};
use crate::client_pool::DestinationKey;
use crate::error::TransportError;

/// Transport producing [`HttpConnection`]s driven by the back loop.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    back: Handle,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(back: Handle, connect_timeout: Duration) -> Self {
        Self { back, connect_timeout }
    }
}

impl BackendTransport for HttpTransport {
    fn connect(&self, key: &DestinationKey) -> Result<Box<dyn BackendConnection>, TransportError> {
        if key.scheme() != "http" {
            return Err(TransportError::InvalidDestination(format!(
                "{}: unsupported scheme {}",
                key,
                key.scheme()
            )));
        }
        let host = HeaderValue::from_str(&key.authority())
            .map_err(|e| TransportError::InvalidDestination(format!("{}: {}", key, e)))?;

        Ok(Box::new(HttpConnection {
            back: self.back.clone(),
            authority: key.authority(),
            host,
            connect_timeout: self.connect_timeout,
            sender: Arc::new(Mutex::new(None)),
        }))
    }
}

/// One lazily dialed HTTP/1.1 connection.
pub struct HttpConnection {
    back: Handle,
    authority: String,
    host: HeaderValue,
    connect_timeout: Duration,
    sender: Arc<Mutex<Option<SendRequest<Body>>>>,
}

impl BackendConnection for HttpConnection {
    fn request(&mut self, head: RequestHead, mut sink: Box<dyn ExchangeSink>) -> Result<(), TransportError> {
        let request = build_request(head, &self.host)?;
        let sender = self.sender.clone();
        let authority = self.authority.clone();
        let connect_timeout = self.connect_timeout;

        self.back.spawn(async move {
            let mut slot = sender.lock().await;

            let ready = match slot.as_mut() {
                Some(existing) => existing.ready().await.is_ok(),
                None => false,
            };
            if !ready {
                match dial(&authority, connect_timeout).await {
                    Ok(fresh) => *slot = Some(fresh),
                    Err(e) => {
                        *slot = None;
                        sink.on_body(BodyEvent::Error(e));
                        return;
                    }
                }
            }

            let Some(send) = slot.as_mut() else {
                sink.on_body(BodyEvent::Error(TransportError::Unavailable(authority)));
                return;
            };

            let response = match send.send_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    *slot = None;
                    sink.on_body(BodyEvent::Error(TransportError::Exchange(e.to_string())));
                    return;
                }
            };
            // The exchange owns the connection until its body is read.
            let (parts, incoming) = response.into_parts();
            sink.on_headers(ResponseHead {
                status: parts.status,
                headers: parts
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            });

            let mut frames = Body::new(incoming).into_data_stream();
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(data) if data.is_empty() => continue,
                    Ok(data) => sink.on_body(BodyEvent::Data(data)),
                    Err(e) => {
                        *slot = None;
                        sink.on_body(BodyEvent::Error(TransportError::Exchange(e.to_string())));
                        return;
                    }
                }
            }
            sink.on_body(BodyEvent::Eof);
        });

        Ok(())
    }
}

async fn dial(authority: &str, connect_timeout: Duration) -> Result<SendRequest<Body>, TransportError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(authority))
        .await
        .map_err(|_| TransportError::ConnectTimeout(connect_timeout.as_secs()))?
        .map_err(|e| TransportError::Connect(format!("{}: {}", authority, e)))?;

    let (sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| TransportError::Connect(format!("{}: {}", authority, e)))?;

    let peer = authority.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(backend = %peer, error = %e, "Backend connection closed with error");
        }
    });

    tracing::debug!(backend = %authority, "Backend connection established");
    Ok(sender)
}

fn build_request(head: RequestHead, host: &HeaderValue) -> Result<Request<Body>, TransportError> {
    let mut builder = Request::builder().method(head.method).uri(head.path.as_str());

    let mut has_host = false;
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in head.headers {
            has_host |= name == header::HOST;
            headers.append(name, value);
        }
        if !has_host {
            headers.insert(header::HOST, host.clone());
        }
    }

    builder
        .body(Body::from(head.body))
        .map_err(|e| TransportError::Exchange(format!("invalid request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, Method};

    #[test]
    fn build_request_copies_headers_and_adds_host() {
        let head = RequestHead::new(Method::POST, "/items?limit=2")
            .header(HeaderName::from_static("x-first"), HeaderValue::from_static("1"))
            .header(HeaderName::from_static("x-second"), HeaderValue::from_static("2"))
            .body("payload");

        let request = build_request(head, &HeaderValue::from_static("svc-a:80")).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "/items?limit=2");
        assert_eq!(request.headers()[header::HOST], "svc-a:80");

        assert_eq!(request.headers()["x-first"], "1");
        assert_eq!(request.headers()["x-second"], "2");
    }

    #[test]
    fn build_request_preserves_client_host() {
        let head = RequestHead::new(Method::GET, "/")
            .header(header::HOST, HeaderValue::from_static("public.example"));
        let request = build_request(head, &HeaderValue::from_static("svc-a:80")).unwrap();
        assert_eq!(request.headers()[header::HOST], "public.example");
    }

    #[tokio::test]
    async fn rejects_non_http_destinations() {
        let transport = HttpTransport::new(Handle::current(), Duration::from_secs(1));
        let key = DestinationKey::parse("https://svc-a").unwrap();
        assert!(matches!(
            transport.connect(&key),
            Err(TransportError::InvalidDestination(_))
        ));
    }
}
