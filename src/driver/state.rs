//! Request lifecycle states.

use std::fmt;

use crate::error::TransportError;

/// Progress of one request. The derived ordering is the order of progress;
/// a request never moves to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestState {
    Init,
    AwaitingBackendInit,
    AcquiringClient,
    Processing,
    HeaderReady,
    /// May recur any number of times.
    BodyChunkReady,
    Done,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Init => "init",
            RequestState::AwaitingBackendInit => "awaiting_backend_init",
            RequestState::AcquiringClient => "acquiring_client",
            RequestState::Processing => "processing",
            RequestState::HeaderReady => "header_ready",
            RequestState::BodyChunkReady => "body_chunk_ready",
            RequestState::Done => "done",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `drive` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting for a wake; the front loop must not re-drive before one arrives.
    Suspend,
    /// Response fully transmitted (or abandoned); the context can be dropped.
    Complete,
}

/// How the backend body stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Eof,
    Error(TransportError),
}

impl StreamEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, StreamEnd::Eof)
    }
}
