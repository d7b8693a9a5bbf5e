//! In-process expiring cache on the tokio clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use skycast_core::Payload;

use crate::{CacheError, ExpiringCache, Fingerprint};

#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<Fingerprint, (Instant, Payload)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn expired(&self, written: Instant) -> bool {
        written.elapsed() >= self.ttl
    }
}

#[async_trait]
impl ExpiringCache for MemoryCache {
    async fn load(&self, key: &Fingerprint) -> Result<Option<Payload>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(written, _)| !self.expired(*written))
            .map(|(_, payload)| payload.clone()))
    }

    async fn store(&self, key: &Fingerprint, payload: &Payload) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.clone(), (Instant::now(), payload.clone()));
        Ok(())
    }

    async fn exists(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn is_expired(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|(written, _)| self.expired(*written)))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
