use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::timer::TimerGauge;
use crate::tracker::PersistTracker;

/// Process-wide counters reported by `/status` and the heartbeat.
#[derive(Debug)]
pub struct RuntimeStats {
    connections: AtomicUsize,
    subscriptions: AtomicUsize,
    started_at_unix: u64,
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self {
            connections: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
            started_at_unix: unix_seconds_now(),
        }
    }
}

impl RuntimeStats {
    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn subscription_added(&self) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
    }

    pub fn subscriptions_removed(&self, n: usize) {
        self.subscriptions.fetch_sub(n, Ordering::SeqCst);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub connections: usize,
    pub subscriptions: usize,
    pub armed_timers: usize,
    pub pending_persist: usize,
    pub started_at_unix: u64,
}

/// Handles every connection and subscription reports into.
#[derive(Debug, Clone, Default)]
pub struct Shared {
    pub timers: TimerGauge,
    pub persist: PersistTracker,
    pub stats: Arc<RuntimeStats>,
}

impl Shared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connections: self.stats.connections(),
            subscriptions: self.stats.subscriptions(),
            armed_timers: self.timers.armed(),
            pending_persist: self.persist.pending(),
            started_at_unix: self.stats.started_at_unix,
        }
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
