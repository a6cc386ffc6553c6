//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::http::StatusCode;
use bytes::Bytes;
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};

use overlay_gateway::backend::{
    BackendConnection, BackendScope, BackendTransport, BodyEvent, ExchangeSink, RequestHead, ResponseHead,
};
use overlay_gateway::bridge::CrossLoopBridge;
use overlay_gateway::client_pool::{DestinationKey, PoolRegistry};
use overlay_gateway::driver::{DriverSettings, OutputChain, RequestDriver, ResponseWriter, WriterClosed};
use overlay_gateway::error::TransportError;
use overlay_gateway::resilience::Backoff;
use overlay_gateway::routing::{PathPrefixMatcher, Route, Router};

/// How a scripted exchange ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEnd {
    Eof,
    Error,
    /// No terminal event; the exchange stays open.
    Never,
}

/// Scripted backend behaviour for one exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: Option<u16>,
    pub chunks: Vec<&'static str>,
    pub end: ReplyEnd,
    /// Exchange waits for a notification before sending anything.
    pub gate: Option<Arc<Notify>>,
}

impl Reply {
    pub fn ok(chunks: Vec<&'static str>) -> Self {
        Self {
            status: Some(200),
            chunks,
            end: ReplyEnd::Eof,
            gate: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            chunks: Vec::new(),
            end: ReplyEnd::Eof,
            gate: None,
        }
    }

    /// Transport failure before any headers.
    pub fn reset() -> Self {
        Self {
            status: None,
            chunks: Vec::new(),
            end: ReplyEnd::Error,
            gate: None,
        }
    }

    pub fn held(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::ok(vec!["late"])
        }
    }

    pub fn never_ending() -> Self {
        Self {
            end: ReplyEnd::Never,
            ..Self::ok(vec!["partial"])
        }
    }
}

/// An exchange the mock transport saw.
#[derive(Debug, Clone)]
pub struct Issued {
    pub connection_id: u64,
    pub head: RequestHead,
}

#[derive(Default)]
struct MockState {
    back: OnceLock<Handle>,
    replies: Mutex<VecDeque<Reply>>,
    issued: Mutex<Vec<Issued>>,
    connects: AtomicUsize,
    next_id: AtomicU64,
}

/// In-memory transport playing scripted replies on the back runtime.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run exchanges on `back` instead of the caller's runtime.
    pub fn bind(&self, back: Handle) {
        let _ = self.state.back.set(back);
    }

    /// Queue a reply; exchanges with no queued reply answer `200` with no body.
    pub fn push_reply(&self, reply: Reply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> Vec<Issued> {
        self.state.issued.lock().unwrap().clone()
    }

    pub fn as_transport(&self) -> Arc<dyn BackendTransport> {
        Arc::new(self.clone())
    }
}

impl BackendTransport for MockTransport {
    fn connect(&self, _key: &DestinationKey) -> Result<Box<dyn BackendConnection>, TransportError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            id,
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    id: u64,
    state: Arc<MockState>,
}

impl BackendConnection for MockConnection {
    fn request(&mut self, head: RequestHead, mut sink: Box<dyn ExchangeSink>) -> Result<(), TransportError> {
        let reply = self
            .state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(Vec::new()));
        self.state.issued.lock().unwrap().push(Issued {
            connection_id: self.id,
            head,
        });

        let runtime = self.state.back.get().cloned().unwrap_or_else(Handle::current);
        runtime.spawn(async move {
            if let Some(gate) = &reply.gate {
                gate.notified().await;
            }
            if let Some(status) = reply.status {
                sink.on_headers(ResponseHead::new(StatusCode::from_u16(status).unwrap()));
            }
            for chunk in &reply.chunks {
                sink.on_body(BodyEvent::Data(Bytes::from_static(chunk.as_bytes())));
                tokio::task::yield_now().await;
            }
            match reply.end {
                ReplyEnd::Eof => sink.on_body(BodyEvent::Eof),
                ReplyEnd::Error => sink.on_body(BodyEvent::Error(TransportError::Exchange("connection reset".into()))),
                ReplyEnd::Never => std::future::pending::<()>().await,
            }
        });
        Ok(())
    }
}

/// What a [`RecordingWriter`] was asked to transmit.
#[derive(Debug, Default)]
pub struct Recorded {
    pub heads: Vec<ResponseHead>,
    pub chains: Vec<OutputChain>,
    pub finished: Option<bool>,
}

impl Recorded {
    pub fn body(&self) -> String {
        let bytes: Vec<u8> = self.chains.iter().flat_map(|chain| chain.to_vec()).collect();
        String::from_utf8(bytes).unwrap()
    }

    pub fn status(&self) -> Option<u16> {
        self.heads.first().map(|head| head.status.as_u16())
    }
}

/// Response writer that records everything and can simulate client teardown.
pub struct RecordingWriter {
    recorded: Arc<Mutex<Recorded>>,
    closed: watch::Receiver<bool>,
    accepting: watch::Receiver<bool>,
}

/// Test-side view of a [`RecordingWriter`].
#[derive(Clone)]
pub struct WriterProbe {
    recorded: Arc<Mutex<Recorded>>,
    close: Arc<watch::Sender<bool>>,
    accept: Arc<watch::Sender<bool>>,
}

pub fn recording_writer() -> (RecordingWriter, WriterProbe) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let (close, closed) = watch::channel(false);
    let (accept, accepting) = watch::channel(true);
    (
        RecordingWriter {
            recorded: recorded.clone(),
            closed,
            accepting,
        },
        WriterProbe {
            recorded,
            close: Arc::new(close),
            accept: Arc::new(accept),
        },
    )
}

impl WriterProbe {
    /// Simulate the client going away.
    pub fn close(&self) {
        let _ = self.close.send(true);
    }

    /// Simulate a client that stops reading the body.
    pub fn pause(&self) {
        let _ = self.accept.send(false);
    }

    pub fn resume(&self) {
        let _ = self.accept.send(true);
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

impl RecordingWriter {
    fn check_open(&self) -> Result<(), WriterClosed> {
        if *self.closed.borrow() {
            Err(WriterClosed)
        } else {
            Ok(())
        }
    }
}

impl ResponseWriter for RecordingWriter {
    fn send_headers(&mut self, head: &ResponseHead) -> Result<(), WriterClosed> {
        self.check_open()?;
        self.recorded.lock().unwrap().heads.push(head.clone());
        Ok(())
    }

    fn send_body(&mut self, chain: OutputChain) -> Result<(), WriterClosed> {
        self.check_open()?;
        self.recorded.lock().unwrap().chains.push(chain);
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        *self.accepting.borrow()
    }

    fn writable(&mut self) -> impl Future<Output = Result<(), WriterClosed>> + Send + '_ {
        async move {
            loop {
                if *self.closed.borrow_and_update() {
                    return Err(WriterClosed);
                }
                if *self.accepting.borrow_and_update() {
                    return Ok(());
                }
                tokio::select! {
                    changed = self.closed.changed() => if changed.is_err() {
                        std::future::pending::<()>().await;
                    },
                    changed = self.accepting.changed() => if changed.is_err() {
                        std::future::pending::<()>().await;
                    },
                }
            }
        }
    }

    fn finish(&mut self, clean: bool) -> Result<(), WriterClosed> {
        self.check_open()?;
        self.recorded.lock().unwrap().finished = Some(clean);
        Ok(())
    }

    fn closed(&mut self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            while !*self.closed.borrow_and_update() {
                if self.closed.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

/// A driver wired to a mock transport, with pools and the bridge on the
/// test runtime. Use a multi-thread runtime: acquisition blocks a worker.
pub struct Harness {
    pub driver: Arc<RequestDriver>,
    pub registry: Arc<PoolRegistry>,
    pub transport: MockTransport,
    pub scope: Arc<BackendScope>,
    pub key: DestinationKey,
}

impl Harness {
    /// One catch-all route to `svc-a` whose scope is already initialized.
    pub fn ready(capacity: usize) -> Self {
        let harness = Self::with_scope(capacity);
        harness.scope.set_state(overlay_gateway::backend::ScopeState::InitCompleted);
        harness
    }

    /// One catch-all route to `svc-a` whose scope has not started.
    pub fn with_scope(capacity: usize) -> Self {
        let key = DestinationKey::parse("http://svc-a").unwrap();
        let scope = Arc::new(BackendScope::new("svc-a", None));
        let route = Route::new("svc-a", key.clone(), scope.clone(), 0, vec![Box::new(PathPrefixMatcher::new("/"))]);
        let router = Arc::new(Router::new(vec![route]));

        let transport = MockTransport::new();
        let registry = Arc::new(PoolRegistry::new(transport.as_transport(), 25));
        let bridge = Arc::new(CrossLoopBridge::new(Handle::current(), 64));
        let settings = DriverSettings {
            pool_capacity: capacity,
            chunk_size: 4096,
            init_poll: Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
        };
        let driver = Arc::new(RequestDriver::new(router, registry.clone(), bridge, settings));

        Self {
            driver,
            registry,
            transport,
            scope,
            key,
        }
    }
}

/// Poll `condition` every 5ms for up to two seconds.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Start a keep-alive HTTP/1.1 backend answering every request with `body`.
///
/// Returns the bound address and a counter of requests served.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = Arc::new(AtomicUsize::new(0));
    let counter = served.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&buf[..n]);
                    while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                        pending.drain(..end + 4);
                        counter.fetch_add(1, Ordering::SeqCst);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    (addr, served)
}
