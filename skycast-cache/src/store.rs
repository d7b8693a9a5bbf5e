//! The expiring cache contract.

use std::time::Duration;

use async_trait::async_trait;

use skycast_core::Payload;

use crate::{CacheError, Fingerprint};

/// Time-keyed payload store. An entry is valid only while
/// `now - write_time < ttl`; the payload's own nominal time plays no part.
///
/// Expired entries are never deleted implicitly: they read as absent and are
/// overwritten by the next `store`.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    /// Payload for `key`, or `None` when absent or expired.
    async fn load(&self, key: &Fingerprint) -> Result<Option<Payload>, CacheError>;

    /// Unconditional overwrite; resets the write time to now.
    async fn store(&self, key: &Fingerprint, payload: &Payload) -> Result<(), CacheError>;

    /// Whether any entry (fresh or expired) was ever written for `key`.
    async fn exists(&self, key: &Fingerprint) -> Result<bool, CacheError>;

    /// Whether an entry exists but is past its TTL. `false` when absent.
    async fn is_expired(&self, key: &Fingerprint) -> Result<bool, CacheError>;

    fn ttl(&self) -> Duration;
}
