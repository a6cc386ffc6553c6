//! Per-request state bundle and the backend callback relay.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::{BodyEvent, ExchangeSink, ResponseHead};
use crate::bridge::{wake_channel, FrontWaker, WakeQueue};
use crate::client_pool::{ClientLease, DestinationKey};
use crate::driver::assembler::ResponseBufferAssembler;
use crate::driver::front::InboundRequest;
use crate::driver::state::{RequestState, StreamEnd};
use crate::error::{GatewayError, TransportError};
use crate::routing::Route;

/// Everything the driver tracks for one inbound request.
///
/// Owned by the request's front-loop task. Other threads reach it only
/// through continuations posted on its waker, and through the assembler.
pub struct RequestContext {
    pub(crate) state: RequestState,
    pub(crate) request: InboundRequest,
    pub(crate) route: Option<Arc<Route>>,
    pub(crate) destination: Option<DestinationKey>,
    pub(crate) lease: Option<ClientLease>,
    pub(crate) head: Option<ResponseHead>,
    pub(crate) status: Option<u16>,
    pub(crate) headers_sent: bool,
    pub(crate) end: Option<StreamEnd>,
    pub(crate) failure: Option<GatewayError>,
    pub(crate) aborted: bool,
    pub(crate) init_polls: u32,
    pub(crate) assembler: Arc<ResponseBufferAssembler>,
    pub(crate) waker: FrontWaker<RequestContext>,
    pub(crate) started: Instant,
}

impl RequestContext {
    /// Create the context and the queue its wakes arrive on.
    pub fn new(request: InboundRequest, chunk_size: usize) -> (Self, WakeQueue<RequestContext>) {
        let (waker, queue) = wake_channel();
        let context = Self {
            state: RequestState::Init,
            request,
            route: None,
            destination: None,
            lease: None,
            head: None,
            status: None,
            headers_sent: false,
            end: None,
            failure: None,
            aborted: false,
            init_polls: 0,
            assembler: Arc::new(ResponseBufferAssembler::new(chunk_size)),
            waker,
            started: Instant::now(),
        };
        (context, queue)
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn destination(&self) -> Option<&DestinationKey> {
        self.destination.as_ref()
    }

    pub fn lease(&self) -> Option<&ClientLease> {
        self.lease.as_ref()
    }

    /// Status relayed to the client, once known.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn init_polls(&self) -> u32 {
        self.init_polls
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Record that the client went away; the next drive tears down.
    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub fn waker(&self) -> &FrontWaker<RequestContext> {
        &self.waker
    }

    /// Move forward to `next`; earlier states are ignored.
    pub(crate) fn advance(&mut self, next: RequestState) {
        if next > self.state {
            tracing::trace!(request_id = %self.request.request_id, from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }

    /// True when the backend exchange finished cleanly with a non-error status.
    pub(crate) fn exchange_clean(&self) -> bool {
        let clean_end = self.end.as_ref().is_some_and(StreamEnd::is_clean);
        let error_status = self
            .head
            .as_ref()
            .map(|h| h.status.is_server_error())
            .or_else(|| self.status.map(|s| s >= 500))
            .unwrap_or(false);
        clean_end && !error_status
    }

    /// Completion of a pool acquisition job.
    pub(crate) fn on_client_acquired(&mut self, lease: ClientLease) {
        tracing::debug!(
            request_id = %self.request.request_id,
            handle_id = lease.handle().id(),
            "Client acquired"
        );
        self.lease = Some(lease);
        self.advance(RequestState::Processing);
    }

    /// Release the leased client, if any. Returns whether it was purged.
    pub(crate) fn release_client(&mut self, purge: bool) -> Option<bool> {
        let lease = self.lease.take()?;
        lease.release(purge);
        Some(purge)
    }

    pub(crate) fn relay(&self) -> ExchangeRelay {
        ExchangeRelay {
            assembler: self.assembler.clone(),
            waker: self.waker.clone(),
            finished: false,
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            // Torn down before Done: an issued exchange left the connection
            // in an unknown state.
            let purge = lease.is_issued() && !self.exchange_clean();
            tracing::debug!(
                request_id = %self.request.request_id,
                state = %self.state,
                purge,
                "Releasing client from abandoned request"
            );
            lease.release(purge);
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request.request_id)
            .field("state", &self.state)
            .field("destination", &self.destination)
            .field("lease", &self.lease)
            .field("headers_sent", &self.headers_sent)
            .field("end", &self.end)
            .field("aborted", &self.aborted)
            .finish()
    }
}

/// Backend callbacks for one exchange, run on the back loop.
///
/// Body bytes go straight into the assembler; every callback also posts a
/// wake so the front loop re-drives the request.
pub struct ExchangeRelay {
    assembler: Arc<ResponseBufferAssembler>,
    waker: FrontWaker<RequestContext>,
    finished: bool,
}

impl ExchangeSink for ExchangeRelay {
    fn on_headers(&mut self, head: ResponseHead) {
        self.waker.post(move |ctx| {
            ctx.status = Some(head.status.as_u16());
            ctx.head = Some(head);
            ctx.advance(RequestState::HeaderReady);
        });
    }

    fn on_body(&mut self, event: BodyEvent) {
        match event {
            BodyEvent::Data(bytes) => {
                self.assembler.push(&bytes);
                self.waker.post(|ctx| ctx.advance(RequestState::BodyChunkReady));
            }
            BodyEvent::Eof => {
                self.finished = true;
                self.waker.post(|ctx| {
                    ctx.end.get_or_insert(StreamEnd::Eof);
                    ctx.advance(RequestState::Done);
                });
            }
            BodyEvent::Error(e) => {
                self.finished = true;
                self.waker.post(move |ctx| {
                    ctx.end.get_or_insert(StreamEnd::Error(e));
                    ctx.advance(RequestState::Done);
                });
            }
        }
    }
}

impl Drop for ExchangeRelay {
    fn drop(&mut self) {
        if !self.finished {
            self.on_body(BodyEvent::Error(TransportError::Exchange(
                "exchange abandoned by transport".into(),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use bytes::Bytes;

    fn context() -> (RequestContext, WakeQueue<RequestContext>) {
        RequestContext::new(InboundRequest::new("req-1", Method::GET, "/".parse().unwrap()), 4)
    }

    fn apply_all(ctx: &mut RequestContext, queue: &mut WakeQueue<RequestContext>) {
        while let Some(next) = queue.try_next() {
            next(ctx);
        }
    }

    #[test]
    fn relay_events_advance_state_in_order() {
        let (mut ctx, mut queue) = context();
        let mut relay = ctx.relay();
        relay.on_headers(ResponseHead::new(StatusCode::OK));
        relay.on_body(BodyEvent::Data(Bytes::from_static(b"abcdef")));
        relay.on_body(BodyEvent::Eof);
        drop(relay);

        apply_all(&mut ctx, &mut queue);
        assert_eq!(ctx.state(), RequestState::Done);
        assert_eq!(ctx.status(), Some(200));
        assert!(ctx.exchange_clean());
        assert_eq!(ctx.assembler.drain().buffers().len(), 2);
    }

    #[test]
    fn abandoned_relay_reports_an_error() {
        let (mut ctx, mut queue) = context();
        drop(ctx.relay());

        apply_all(&mut ctx, &mut queue);
        assert_eq!(ctx.state(), RequestState::Done);
        assert!(matches!(ctx.end, Some(StreamEnd::Error(_))));
        assert!(!ctx.exchange_clean());
    }

    #[test]
    fn server_error_status_is_not_clean() {
        let (mut ctx, mut queue) = context();
        let mut relay = ctx.relay();
        relay.on_headers(ResponseHead::new(StatusCode::SERVICE_UNAVAILABLE));
        relay.on_body(BodyEvent::Eof);

        apply_all(&mut ctx, &mut queue);
        assert!(!ctx.exchange_clean());
    }

    #[test]
    fn state_never_moves_backwards() {
        let (mut ctx, _queue) = context();
        ctx.advance(RequestState::HeaderReady);
        ctx.advance(RequestState::Processing);
        assert_eq!(ctx.state(), RequestState::HeaderReady);

        ctx.advance(RequestState::BodyChunkReady);
        ctx.advance(RequestState::BodyChunkReady);
        assert_eq!(ctx.state(), RequestState::BodyChunkReady);
    }
}
