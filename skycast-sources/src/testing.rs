//! In-memory fakes for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skycast_cache::{ExpiringCache, MemoryCache};
use skycast_core::FetchError;

use crate::{Download, SourceContext, SourcesConfig, StationTable, Upstream};

/// URL → body. Unknown URLs are 404s. Every request is recorded.
#[derive(Default)]
pub struct MapUpstream {
    pages: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MapUpstream {
    pub fn put(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.pages.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for MapUpstream {
    async fn get(&self, url: &str) -> Result<Download, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(match self.pages.lock().unwrap().get(url) {
            Some(body) => Download::Found(body.clone()),
            None => Download::Missing,
        })
    }
}

pub fn context(
    dir: &Path,
    config: SourcesConfig,
    upstream: Arc<MapUpstream>,
    cache: Arc<dyn ExpiringCache>,
    now: DateTime<Utc>,
) -> Arc<SourceContext> {
    Arc::new(
        SourceContext::new(
            config,
            dir.join("static"),
            dir.join("data"),
            cache,
            upstream,
            Arc::new(StationTable::empty()),
        )
        .with_clock(Arc::new(move || now)),
    )
}

pub fn memory_cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new(Duration::from_secs(300)))
}

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}
