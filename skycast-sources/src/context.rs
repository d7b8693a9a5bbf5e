//! Process-wide, read-only state shared by every Data Source.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use skycast_cache::{ExpiringCache, Fingerprint};
use skycast_core::{FetchError, Payload, PersistJob};

use crate::{SourcesConfig, StationTable, Upstream};

/// Wall-clock source used for nominal-time arithmetic.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Built once at startup and handed to the registry by `Arc`.
pub struct SourceContext {
    pub config: SourcesConfig,
    pub static_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache: Arc<dyn ExpiringCache>,
    pub upstream: Arc<dyn Upstream>,
    pub stations: Arc<StationTable>,
    clock: Clock,
}

impl SourceContext {
    pub fn new(
        config: SourcesConfig,
        static_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        cache: Arc<dyn ExpiringCache>,
        upstream: Arc<dyn Upstream>,
        stations: Arc<StationTable>,
    ) -> Self {
        Self {
            config,
            static_dir: static_dir.into(),
            data_dir: data_dir.into(),
            cache,
            upstream,
            stations,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// First-cycle cache lookup. A failing cache read is logged and treated
    /// as a miss so the cycle falls through to a live fetch.
    pub async fn cached(&self, key: &Fingerprint) -> Option<Payload> {
        match self.cache.load(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed; fetching live");
                None
            }
        }
    }

    /// Detached job writing every entry to the cache, or `None` when there is
    /// nothing to persist.
    pub fn persist(&self, entries: Vec<(Fingerprint, Payload)>) -> Option<PersistJob> {
        if entries.is_empty() {
            return None;
        }
        let cache = Arc::clone(&self.cache);
        let job: PersistJob = Box::pin(async move {
            for (key, payload) in entries {
                cache.store(&key, &payload).await?;
            }
            Ok::<(), FetchError>(())
        });
        Some(job)
    }
}
