//! Cancellable task scheduling on the tokio runtime the client was built in.
//!
//! Deferred-command retries, long-poll renewals and in-flight requests all run
//! as tasks spawned here. `shutdown` (or dropping the scheduler) cancels every
//! one of them. Timers go through `tokio::time`, so tests drive them with a
//! paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::{PushletError, Result};

#[derive(Debug)]
pub struct Scheduler {
    handle: Handle,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Bind to the current tokio runtime.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| PushletError::NoRuntime)?;
        Ok(Self {
            handle,
            cancel: CancellationToken::new(),
        })
    }

    /// Run `task` until it completes or the scheduler shuts down.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn requires_runtime() {
        let err = Scheduler::new().unwrap_err();
        assert_eq!(err.error_code(), "no_runtime");
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_waits_for_delay() {
        let scheduler = Scheduler::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        scheduler.schedule(Duration::from_millis(500), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let scheduler = Scheduler::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        scheduler.schedule(Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_timers() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = Scheduler::new().unwrap();
            let counter = fired.clone();
            scheduler.schedule(Duration::from_millis(100), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
