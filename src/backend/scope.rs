//! Backend scope readiness.
//!
//! # Responsibilities
//! - Track the startup handshake of one route's backend scope
//! - Let the request driver check readiness without blocking
//!
//! # Design Decisions
//! - State is a single atomic; readers never lock
//! - Progress only moves forward, except into `Failed`

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

/// Startup progress of a backend scope.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeState {
    Init = 0,
    LoopStarted = 1,
    InitStarted = 2,
    InitCompleted = 3,
    Failed = 4,
}

impl From<u8> for ScopeState {
    fn from(val: u8) -> Self {
        match val {
            1 => ScopeState::LoopStarted,
            2 => ScopeState::InitStarted,
            3 => ScopeState::InitCompleted,
            4 => ScopeState::Failed,
            _ => ScopeState::Init,
        }
    }
}

/// Errors from a scope's startup handshake.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("identity {path} unreadable: {source}")]
    Identity {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity {0} is not a regular file")]
    NotAFile(PathBuf),
}

/// Readiness of the backend transport for one route.
#[derive(Debug)]
pub struct BackendScope {
    name: String,
    identity_path: Option<PathBuf>,
    state: AtomicU8,
}

impl BackendScope {
    pub fn new(name: impl Into<String>, identity_path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            identity_path,
            state: AtomicU8::new(ScopeState::Init as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity_path(&self) -> Option<&PathBuf> {
        self.identity_path.as_ref()
    }

    pub fn state(&self) -> ScopeState {
        ScopeState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ScopeState::InitCompleted
    }

    /// Advance to `next`. Moving backwards is ignored; `Failed` is terminal.
    pub fn set_state(&self, next: ScopeState) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            let current = ScopeState::from(current);
            (current != ScopeState::Failed && next > current).then_some(next as u8)
        });
    }

    /// Run the startup handshake: verify the identity, then mark ready.
    pub async fn initialize(&self) -> Result<(), ScopeError> {
        self.set_state(ScopeState::InitStarted);
        tracing::debug!(scope = %self.name, "Backend scope initialization started");

        if let Some(path) = &self.identity_path {
            let metadata = match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata,
                Err(source) => {
                    self.set_state(ScopeState::Failed);
                    return Err(ScopeError::Identity {
                        path: path.clone(),
                        source,
                    });
                }
            };
            if !metadata.is_file() {
                self.set_state(ScopeState::Failed);
                return Err(ScopeError::NotAFile(path.clone()));
            }
        }

        self.set_state(ScopeState::InitCompleted);
        tracing::info!(scope = %self.name, "Backend scope ready");
        Ok(())
    }
}
