//! Front-loop wake queue.
//!
//! Each suspended request owns a [`WakeQueue`]. Anything that wants the
//! request to make progress posts a continuation through a cloned
//! [`FrontWaker`]; the front loop applies continuations in posting order and
//! then re-drives the request.

use std::time::Duration;
use tokio::sync::mpsc;

/// Work to run against a request's context on the front loop.
pub type Continuation<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Create a connected waker / queue pair.
pub fn wake_channel<C>() -> (FrontWaker<C>, WakeQueue<C>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrontWaker { tx }, WakeQueue { rx })
}

/// Sending half: posts continuations to one request.
pub struct FrontWaker<C> {
    tx: mpsc::UnboundedSender<Continuation<C>>,
}

impl<C> Clone for FrontWaker<C> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<C: 'static> FrontWaker<C> {
    /// Queue `f` for the front loop. Returns false if the request is gone,
    /// in which case `f` is dropped unrun.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.tx.send(Box::new(f)).is_ok()
    }

    /// Re-drive the request without changing its context.
    pub fn wake(&self) -> bool {
        self.post(|_| {})
    }

    /// Re-drive the request after `delay`. Must be called within a runtime.
    pub fn wake_after(&self, delay: Duration) {
        let waker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            waker.wake();
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the request's front-loop task.
pub struct WakeQueue<C> {
    rx: mpsc::UnboundedReceiver<Continuation<C>>,
}

impl<C> WakeQueue<C> {
    /// Wait for the next continuation.
    pub async fn next(&mut self) -> Option<Continuation<C>> {
        self.rx.recv().await
    }

    /// Take a continuation if one is already queued.
    pub fn try_next(&mut self) -> Option<Continuation<C>> {
        self.rx.try_recv().ok()
    }
}
