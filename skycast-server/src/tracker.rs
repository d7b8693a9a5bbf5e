//! Supervision of detached persistence jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use skycast_core::{FeedId, PersistJob};

/// Every `post_fetch` job runs on this tracker so shutdown can wait for
/// outstanding cache writes, or give up on them with a warning.
#[derive(Debug, Clone, Default)]
pub struct PersistTracker {
    tasks: TaskTracker,
    pending: Arc<AtomicUsize>,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PersistTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, feed: FeedId, job: PersistJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.pending));
        self.tasks.spawn(async move {
            let _guard = guard;
            match job.await {
                Ok(()) => debug!(feed = %feed, "persisted"),
                Err(err) => warn!(feed = %feed, error = %err, "persist step failed"),
            }
        });
    }

    /// Jobs spawned and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for outstanding jobs. Returns how many were
    /// abandoned.
    pub async fn drain(&self, timeout: Duration) -> usize {
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok() {
            return 0;
        }
        let abandoned = self.pending();
        if abandoned > 0 {
            warn!(abandoned, "abandoning unfinished persist jobs");
        }
        abandoned
    }
}
