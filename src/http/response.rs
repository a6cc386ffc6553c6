//! Streaming response writer.
//!
//! # Responsibilities
//! - Hand the response head to the waiting axum handler
//! - Stream output chains into the response body
//! - Report client teardown to the request driver
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped from the backend head
//! - An unclean finish ends the body with an error so hyper aborts the
//!   connection instead of completing a truncated message
//! - The body channel is bounded; one slot stays reserved for that error,
//!   and a full channel leaves further output in the request's assembler

use axum::body::Body;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::future::Future;
use std::io;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::backend::ResponseHead;
use crate::driver::{OutputChain, ResponseWriter, WriterClosed};

type BodyItem = Result<OutputChain, io::Error>;

/// Chains in flight between the request task and the response body,
/// including the slot reserved for an unclean finish.
pub const BODY_CHANNEL_DEPTH: usize = 8;

/// Headers meaningful only for a single transport-level connection.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || name.as_str() == "keep-alive"
}

/// Writer half, owned by the request task.
pub struct StreamingResponseWriter {
    head_tx: Option<oneshot::Sender<Response>>,
    body_tx: Option<mpsc::Sender<BodyItem>>,
    body_rx: Option<mpsc::Receiver<BodyItem>>,
}

/// Handler half: resolves to the response once the head is known.
pub struct PendingResponse {
    head_rx: oneshot::Receiver<Response>,
}

impl StreamingResponseWriter {
    pub fn new() -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let writer = Self {
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
            body_rx: Some(body_rx),
        };
        (writer, PendingResponse { head_rx })
    }
}

impl ResponseWriter for StreamingResponseWriter {
    fn send_headers(&mut self, head: &ResponseHead) -> Result<(), WriterClosed> {
        let (Some(head_tx), Some(body_rx)) = (self.head_tx.take(), self.body_rx.take()) else {
            return Err(WriterClosed);
        };

        let chains = stream::unfold(body_rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        let body = Body::from_stream(chains.flat_map(|item| {
            let buffers: Vec<Result<Bytes, io::Error>> = match item {
                Ok(chain) => chain.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(buffers)
        }));

        let mut response = Response::new(body);
        *response.status_mut() = head.status;
        let headers = response.headers_mut();
        for (name, value) in head.headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
            headers.append(name.clone(), value.clone());
        }

        head_tx.send(response).map_err(|_| WriterClosed)
    }

    fn send_body(&mut self, chain: OutputChain) -> Result<(), WriterClosed> {
        let body_tx = self.body_tx.as_ref().ok_or(WriterClosed)?;
        match body_tx.try_send(Ok(chain)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(WriterClosed),
            Err(TrySendError::Full(_)) => {
                // Callers check `has_capacity` first.
                tracing::error!("Response body channel full on send, dropping client");
                Err(WriterClosed)
            }
        }
    }

    fn has_capacity(&self) -> bool {
        self.body_tx.as_ref().is_some_and(|tx| tx.capacity() > 1)
    }

    fn writable(&mut self) -> impl Future<Output = Result<(), WriterClosed>> + Send + '_ {
        async move {
            if let Some(head_tx) = self.head_tx.as_mut() {
                head_tx.closed().await;
                return Err(WriterClosed);
            }
            let body_tx = self.body_tx.as_ref().ok_or(WriterClosed)?;
            // Two free slots: one for the next chain, one kept in reserve.
            let permits = body_tx.reserve_many(2).await.map_err(|_| WriterClosed)?;
            drop(permits);
            Ok(())
        }
    }

    fn finish(&mut self, clean: bool) -> Result<(), WriterClosed> {
        let body_tx = self.body_tx.take().ok_or(WriterClosed)?;
        if !clean {
            body_tx
                .try_send(Err(io::Error::other("backend response ended abnormally")))
                .map_err(|_| WriterClosed)?;
        }
        Ok(())
    }

    fn closed(&mut self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            if let Some(head_tx) = self.head_tx.as_mut() {
                head_tx.closed().await;
            } else if let Some(body_tx) = self.body_tx.as_ref() {
                body_tx.closed().await;
            } else {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl PendingResponse {
    /// Wait for the driver to produce the response head.
    pub async fn into_response(self) -> Response {
        match self.head_rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!("Request task ended without a response");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal gateway error").into_response()
            }
        }
    }
}
