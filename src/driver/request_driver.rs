//! Per-request state machine and its front-loop runner.

use axum::http::{header, HeaderValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{ResponseHead, ScopeState};
use crate::bridge::CrossLoopBridge;
use crate::client_pool::{ClientLease, PoolRegistry};
use crate::driver::assembler::OutputChain;
use crate::driver::context::RequestContext;
use crate::driver::front::{InboundRequest, ResponseWriter, WriterClosed};
use crate::driver::state::{RequestState, Step, StreamEnd};
use crate::error::{GatewayError, PoolError, TransportError};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::routing::Router;

/// Tunables the driver reads on every request.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub pool_capacity: usize,
    pub chunk_size: usize,
    pub init_poll: Backoff,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            pool_capacity: 10,
            chunk_size: 4096,
            init_poll: Backoff::new(Duration::from_millis(100), Duration::from_millis(2000)),
        }
    }
}

/// Drives requests from routing through pool acquisition, the backend
/// exchange and response transmission.
pub struct RequestDriver {
    router: Arc<Router>,
    registry: Arc<PoolRegistry>,
    bridge: Arc<CrossLoopBridge>,
    settings: DriverSettings,
}

impl RequestDriver {
    pub fn new(
        router: Arc<Router>,
        registry: Arc<PoolRegistry>,
        bridge: Arc<CrossLoopBridge>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            router,
            registry,
            bridge,
            settings,
        }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Spawn the request's task on the current (front) runtime.
    pub fn spawn<W>(self: &Arc<Self>, request: InboundRequest, writer: W) -> tokio::task::JoinHandle<()>
    where
        W: ResponseWriter + 'static,
    {
        let driver = self.clone();
        tokio::spawn(async move { driver.run(request, writer).await })
    }

    /// Run one request to completion.
    ///
    /// Drives the context, then sleeps until a continuation arrives or the
    /// client goes away. All continuations already queued are applied
    /// before the next drive.
    pub async fn run<W: ResponseWriter>(&self, request: InboundRequest, mut writer: W) {
        let (mut ctx, mut queue) = RequestContext::new(request, self.settings.chunk_size);

        loop {
            if self.drive(&mut ctx, &mut writer) == Step::Complete {
                break;
            }

            tokio::select! {
                biased;
                next = queue.next() => match next {
                    Some(continuation) => {
                        continuation(&mut ctx);
                        while let Some(continuation) = queue.try_next() {
                            continuation(&mut ctx);
                        }
                    }
                    None => ctx.mark_aborted(),
                },
                writable = writer_signal(&mut writer) => {
                    if writable.is_err() {
                        tracing::debug!(request_id = %ctx.request_id(), state = %ctx.state(), "Client went away");
                        ctx.mark_aborted();
                    }
                }
            }
        }
    }

    /// Advance the request as far as it can go without waiting.
    pub fn drive<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Step {
        if ctx.aborted {
            return self.abort(ctx);
        }
        if let Some(err) = ctx.failure.take() {
            return self.fail(ctx, writer, err);
        }

        let step = match ctx.state {
            RequestState::Init => self.on_init(ctx, writer),
            RequestState::AwaitingBackendInit => Ok(self.check_scope(ctx, writer)),
            // Only the acquisition completion moves the request on.
            RequestState::AcquiringClient => Ok(Step::Suspend),
            RequestState::Processing => Ok(self.on_processing(ctx, writer)),
            RequestState::HeaderReady | RequestState::BodyChunkReady => self.on_output(ctx, writer),
            RequestState::Done => self.on_done(ctx, writer),
        };

        match step {
            Ok(step) => step,
            Err(WriterClosed) => {
                ctx.mark_aborted();
                self.abort(ctx)
            }
        }
    }

    fn on_init<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Result<Step, WriterClosed> {
        let Some(route) = self.router.match_request(&ctx.request) else {
            let target = format!("{}{}", ctx.request.host().unwrap_or_default(), ctx.request.path());
            return Ok(self.fail(ctx, writer, GatewayError::NoRoute(target)));
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            route = %route.name,
            destination = %route.destination,
            "Route matched"
        );
        ctx.destination = Some(route.destination.clone());
        ctx.route = Some(route);
        Ok(self.check_scope(ctx, writer))
    }

    /// Start acquisition once the route's scope is ready; otherwise poll again later.
    fn check_scope<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Step {
        let Some(route) = ctx.route.clone() else {
            let err = GatewayError::NoRoute(ctx.request.path().to_string());
            return self.fail(ctx, writer, err);
        };

        match route.scope.state() {
            ScopeState::InitCompleted => self.begin_acquire(ctx, writer),
            ScopeState::Failed => self.fail(ctx, writer, GatewayError::ScopeFailed(route.scope.name().to_string())),
            pending => {
                ctx.advance(RequestState::AwaitingBackendInit);
                ctx.init_polls += 1;
                let delay = self.settings.init_poll.delay(ctx.init_polls);
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    scope = %route.scope.name(),
                    scope_state = ?pending,
                    attempt = ctx.init_polls,
                    delay_ms = delay.as_millis() as u64,
                    "Backend scope not ready, polling later"
                );
                ctx.waker.wake_after(delay);
                Step::Suspend
            }
        }
    }

    fn begin_acquire<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Step {
        let Some(key) = ctx.destination.clone() else {
            let err = GatewayError::NoRoute(ctx.request.path().to_string());
            return self.fail(ctx, writer, err);
        };
        ctx.advance(RequestState::AcquiringClient);

        let registry = self.registry.clone();
        let capacity = self.settings.pool_capacity;
        let submitted = self.bridge.submit(
            move || registry.acquire(&key, capacity),
            |ctx: &mut RequestContext, acquired: Result<ClientLease, PoolError>| match acquired {
                Ok(lease) => ctx.on_client_acquired(lease),
                Err(e) => ctx.failure = Some(e.into()),
            },
            &ctx.waker,
        );

        match submitted {
            Ok(()) => Step::Suspend,
            Err(e) => self.fail(ctx, writer, e.into()),
        }
    }

    fn on_processing<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Step {
        match ctx.lease.as_ref() {
            None => {
                let err = TransportError::Unavailable("no client leased for exchange".into());
                return self.fail(ctx, writer, err.into());
            }
            Some(lease) if lease.is_issued() => return Step::Suspend,
            Some(_) => {}
        }

        let head = ctx.request.to_backend_head();
        let relay = ctx.relay();
        let Some(lease) = ctx.lease.as_mut() else {
            return Step::Suspend;
        };

        tracing::debug!(
            request_id = %ctx.request.request_id,
            handle_id = lease.handle().id(),
            method = %head.method,
            path = %head.path,
            "Issuing backend exchange"
        );
        match lease.issue(head, Box::new(relay)) {
            Ok(()) => Step::Suspend,
            Err(e) => self.fail(ctx, writer, e.into()),
        }
    }

    fn on_output<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Result<Step, WriterClosed> {
        flush(ctx, writer)?;
        Ok(Step::Suspend)
    }

    fn on_done<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W) -> Result<Step, WriterClosed> {
        if ctx.head.is_none() && !ctx.headers_sent {
            let err = match ctx.end.take() {
                Some(StreamEnd::Error(e)) => e,
                _ => TransportError::Exchange("backend closed without a response".into()),
            };
            return Ok(self.fail(ctx, writer, err.into()));
        }

        flush(ctx, writer)?;
        if !ctx.assembler.is_empty() {
            // The client is behind; finish once the backlog has drained.
            return Ok(Step::Suspend);
        }
        let stream_clean = ctx.end.as_ref().is_some_and(StreamEnd::is_clean);
        writer.finish(stream_clean)?;

        let purge = !ctx.exchange_clean();
        ctx.release_client(purge);
        self.complete(ctx, purge);
        Ok(Step::Complete)
    }

    /// End the request with an error response, or truncate the response
    /// if its head already went out.
    fn fail<W: ResponseWriter>(&self, ctx: &mut RequestContext, writer: &mut W, err: GatewayError) -> Step {
        let status = err.status();
        match &err {
            GatewayError::Pool(_) | GatewayError::Bridge(_) => {
                tracing::error!(request_id = %ctx.request_id(), error = %err, "Request failed");
            }
            _ => tracing::warn!(request_id = %ctx.request_id(), error = %err, "Request failed"),
        }

        let sent = if ctx.headers_sent {
            writer.finish(false)
        } else {
            ctx.status = Some(status.as_u16());
            ctx.headers_sent = true;
            send_error_response(writer, status, &err)
        };
        if sent.is_err() {
            tracing::debug!(request_id = %ctx.request_id(), "Client gone before error response");
        }

        // An issued exchange that failed leaves the connection unusable.
        let purge = ctx.lease.as_ref().is_some_and(|lease| lease.is_issued());
        ctx.release_client(purge);
        self.complete(ctx, purge);
        Step::Complete
    }

    /// Tear down after the client went away.
    fn abort(&self, ctx: &mut RequestContext) -> Step {
        let purge = ctx.lease.as_ref().is_some_and(|lease| lease.is_issued()) && !ctx.exchange_clean();
        if let Some(purged) = ctx.release_client(purge) {
            tracing::debug!(request_id = %ctx.request_id(), state = %ctx.state, purged, "Released client of aborted request");
        }
        ctx.status.get_or_insert(499);
        self.complete(ctx, purge);
        Step::Complete
    }

    fn complete(&self, ctx: &mut RequestContext, purged: bool) {
        ctx.advance(RequestState::Done);
        let status = ctx.status.unwrap_or(0);
        let elapsed = ctx.started.elapsed();
        metrics::record_request(status, elapsed);
        tracing::debug!(
            request_id = %ctx.request_id(),
            destination = ?ctx.destination.as_ref().map(|d| d.as_str()),
            status,
            purged,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request complete"
        );
    }
}

impl std::fmt::Debug for RequestDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDriver")
            .field("registry", &self.registry)
            .field("bridge", &self.bridge)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Send the head if it is known and not yet sent, then everything buffered.
///
/// Body bytes stay in the assembler until the head has gone out.
fn flush<W: ResponseWriter>(ctx: &mut RequestContext, writer: &mut W) -> Result<(), WriterClosed> {
    if !ctx.headers_sent {
        let Some(head) = ctx.head.as_ref() else {
            return Ok(());
        };
        writer.send_headers(head)?;
        ctx.headers_sent = true;
    }

    if !writer.has_capacity() {
        return Ok(());
    }
    let chain = ctx.assembler.drain();
    if !chain.is_empty() {
        writer.send_body(chain)?;
    }
    Ok(())
}

/// What the runner waits on besides the wake queue: capacity while the
/// client is behind, otherwise only teardown.
async fn writer_signal<W: ResponseWriter>(writer: &mut W) -> Result<(), WriterClosed> {
    if writer.has_capacity() {
        writer.closed().await;
        Err(WriterClosed)
    } else {
        writer.writable().await
    }
}

fn send_error_response<W: ResponseWriter>(
    writer: &mut W,
    status: axum::http::StatusCode,
    err: &GatewayError,
) -> Result<(), WriterClosed> {
    let body = Bytes::from(format!("{}\n", err));
    let mut head = ResponseHead::new(status);
    head.headers.push((header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")));
    head.headers.push((header::CONTENT_LENGTH, HeaderValue::from(body.len())));

    writer.send_headers(&head)?;
    let mut chain = OutputChain::new();
    chain.push(body);
    writer.send_body(chain)?;
    writer.finish(true)
}
