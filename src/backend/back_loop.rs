//! The back loop: a dedicated thread driving all backend I/O.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::backend::scope::{BackendScope, ScopeState};

/// Blocking threads kept beyond the bridge's job limit, for runtime
/// internals such as `tokio::fs` in scope handshakes.
pub const RESERVED_BLOCKING_THREADS: usize = 8;

/// Owner of the back-loop thread and its single-threaded runtime.
///
/// Blocking work submitted through [`Handle::spawn_blocking`] runs on the
/// runtime's worker threads, off the loop thread itself. A job waiting on a
/// pool's admission gate holds its thread, so the runtime keeps one thread
/// per admissible bridge job; a saturated destination then never delays
/// another destination's acquisition.
pub struct BackLoop {
    handle: Handle,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl BackLoop {
    /// Start the loop and run each scope's startup handshake on it.
    ///
    /// `max_pending` is the bridge's in-flight job limit; the blocking pool
    /// is sized so every admitted job gets a thread immediately.
    pub fn start(scopes: Vec<Arc<BackendScope>>, max_pending: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(max_pending + RESERVED_BLOCKING_THREADS)
            .thread_name("gateway-back-worker")
            .build()?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("gateway-back-loop".into())
            .spawn(move || {
                runtime.block_on(async move {
                    for scope in scopes {
                        scope.set_state(ScopeState::LoopStarted);
                        tokio::spawn(async move {
                            if let Err(e) = scope.initialize().await {
                                tracing::error!(scope = %scope.name(), error = %e, "Backend scope failed to initialize");
                            }
                        });
                    }
                    tracing::info!("Back loop running");
                    let _ = stop_rx.await;
                });
                runtime.shutdown_timeout(Duration::from_secs(1));
                tracing::info!("Back loop stopped");
            })?;

        Ok(Self {
            handle,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Stop the loop and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Back loop thread panicked");
            }
        }
    }
}

impl Drop for BackLoop {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
