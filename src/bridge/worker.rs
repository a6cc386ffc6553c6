//! Blocking work handoff from the front loop to back-loop workers.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, TryAcquireError};

use crate::bridge::wake::FrontWaker;
use crate::error::BridgeError;

/// Runs blocking work off the front loop and resumes the request when done.
#[derive(Debug)]
pub struct CrossLoopBridge {
    back: Handle,
    slots: Arc<Semaphore>,
    max_pending: usize,
}

impl CrossLoopBridge {
    /// `back` is the back-loop runtime whose blocking workers run the jobs.
    pub fn new(back: Handle, max_pending: usize) -> Self {
        Self {
            back,
            slots: Arc::new(Semaphore::new(max_pending)),
            max_pending,
        }
    }

    /// Run `work` on a worker thread, then post `completion` to the front loop.
    ///
    /// `completion` receives the request context and `work`'s output. It is
    /// never called before `work` returns, and if the request is gone by then
    /// it is dropped together with the output.
    pub fn submit<C, T, W, F>(&self, work: W, completion: F, waker: &FrontWaker<C>) -> Result<(), BridgeError>
    where
        C: 'static,
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce(&mut C, T) + Send + 'static,
    {
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                tracing::warn!(max_pending = self.max_pending, "Worker pool saturated, rejecting job");
                return Err(BridgeError::Saturated(self.max_pending));
            }
            Err(TryAcquireError::Closed) => return Err(BridgeError::ShuttingDown),
        };

        let waker = waker.clone();
        self.back.spawn_blocking(move || {
            let output = work();
            drop(permit);
            if !waker.post(move |ctx| completion(ctx, output)) {
                tracing::debug!("Request gone before its job completed");
            }
        });
        Ok(())
    }

    /// Number of submitted jobs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.max_pending.saturating_sub(self.slots.available_permits())
    }

    /// Refuse further submissions.
    pub fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::wake::wake_channel;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn completion_runs_after_work_with_its_output() {
        let bridge = CrossLoopBridge::new(Handle::current(), 4);
        let (waker, mut queue) = wake_channel::<Vec<String>>();
        let work_done = Arc::new(AtomicBool::new(false));

        let flag = work_done.clone();
        bridge
            .submit(
                move || {
                    std::thread::sleep(Duration::from_millis(20));
                    flag.store(true, Ordering::SeqCst);
                    42
                },
                {
                    let flag = work_done.clone();
                    move |log: &mut Vec<String>, value: i32| {
                        assert!(flag.load(Ordering::SeqCst));
                        log.push(format!("got {}", value));
                    }
                },
                &waker,
            )
            .unwrap();

        let mut log = Vec::new();
        let next = queue.next().await.unwrap();
        next(&mut log);
        assert_eq!(log, vec!["got 42".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saturated_pool_rejects_synchronously() {
        let bridge = CrossLoopBridge::new(Handle::current(), 1);
        let (waker, mut queue) = wake_channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        bridge
            .submit(move || { let _ = release_rx.recv(); }, |_, _| {}, &waker)
            .unwrap();
        assert_eq!(bridge.in_flight(), 1);

        let err = bridge.submit(|| (), |_, _| {}, &waker).unwrap_err();
        assert_eq!(err, BridgeError::Saturated(1));

        release_tx.send(()).unwrap();
        let next = queue.next().await.unwrap();
        next(&mut ());
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn closed_bridge_rejects() {
        let bridge = CrossLoopBridge::new(Handle::current(), 4);
        let (waker, _queue) = wake_channel::<()>();
        bridge.close();
        assert_eq!(
            bridge.submit(|| (), |_, _| {}, &waker).unwrap_err(),
            BridgeError::ShuttingDown
        );
    }
}
