//! Graceful shutdown and in-flight stream accounting.
//!
//! The accept loop stops once [`ShutdownCoordinator::cancelled`] resolves.
//! Every response stream holds a [`StreamGuard`], so the server can wait for
//! open streams to finish before exiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Notify};

use crate::metrics;

/// Shared shutdown signal plus the count of open streams.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    stopping: watch::Sender<bool>,
    active: AtomicU64,
    next_id: AtomicU64,
    drained: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (stopping, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                stopping,
                active: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                drained: Notify::new(),
            }),
        }
    }

    /// Signal shutdown. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.inner.stopping.send_replace(true);
    }

    /// Resolves once shutdown has been signaled, immediately if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.stopping.subscribe();
        while !*rx.borrow_and_update() {
            // The sender lives in `self`, so the channel cannot close here
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of streams currently open.
    pub fn active_streams(&self) -> u64 {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Count a new stream as open until the returned guard is dropped.
    pub fn register_stream(&self) -> StreamGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let open = self.inner.active.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_stream_start(open);

        StreamGuard {
            inner: self.inner.clone(),
            id,
            started: Instant::now(),
        }
    }

    /// Wait until no stream is open.
    pub async fn wait_for_drain(&self) {
        loop {
            // Registered before the check so a concurrent last drop is not missed
            let notified = self.inner.drained.notified();
            if self.active_streams() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one stream counted as open.
pub struct StreamGuard {
    inner: Arc<Inner>,
    id: u64,
    started: Instant,
}

impl StreamGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        metrics::record_stream_duration(self.started.elapsed());

        // Each guard matches exactly one increment
        let remaining = self.inner.active.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_active_streams(remaining);
        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}
