//! File-per-entry expiring cache.
//!
//! Each entry is a JSON document `<root>/<fingerprint>.json` holding the
//! write time and the payload. Writes go to a uniquely named `.tmp` sibling
//! and are renamed into place, so readers never observe a partial document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use skycast_core::{NominalTime, Payload};

use crate::error::{io_err, json_err};
use crate::{CacheError, ExpiringCache, Fingerprint};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// On-disk entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheDocument {
    pub written_at: DateTime<Utc>,
    pub payload: Payload,
}

/// Summary of one stored entry, for listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryInfo {
    pub key: Fingerprint,
    pub written_at: DateTime<Utc>,
    pub nominal: Option<NominalTime>,
    pub expired: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    ttl: Duration,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn expired_at(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // Clock skew (write time in the future) reads as fresh.
        let age = now
            .signed_duration_since(written_at)
            .to_std()
            .unwrap_or_default();
        age >= self.ttl
    }

    async fn read_document(&self, key: &Fingerprint) -> Result<Option<CacheDocument>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&path, err)),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|e| json_err(&path, e))?;
        Ok(Some(doc))
    }

    async fn write_document(&self, key: &Fingerprint, doc: &CacheDocument) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;

        let path = self.entry_path(key);
        let json = serde_json::to_vec(doc).map_err(|e| json_err(&path, e))?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .root
            .join(format!("{key}.json.{}-{seq}.tmp", std::process::id()));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, err));
        }
        Ok(())
    }

    /// Every readable entry under the root, sorted by key. Unreadable
    /// documents are skipped with a warning.
    pub async fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&self.root, err)),
        };

        let now = Utc::now();
        let mut out = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_err(&self.root, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = Fingerprint::from_stem(stem);
            let doc = match self.read_document(&key).await {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable cache entry");
                    continue;
                }
            };
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            out.push(EntryInfo {
                expired: self.expired_at(doc.written_at, now),
                key,
                written_at: doc.written_at,
                nominal: doc.payload.nominal,
                size_bytes,
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    /// Delete expired entries. Returns how many were removed.
    pub async fn prune_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for info in self.entries().await? {
            if !info.expired {
                continue;
            }
            let path = self.entry_path(&info.key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(io_err(&path, err)),
            }
        }
        debug!(removed, root = %self.root.display(), "pruned expired cache entries");
        Ok(removed)
    }
}

#[async_trait]
impl ExpiringCache for FileCache {
    async fn load(&self, key: &Fingerprint) -> Result<Option<Payload>, CacheError> {
        let doc = match self.read_document(key).await {
            Ok(doc) => doc,
            Err(CacheError::Json { path, source }) => {
                warn!(path = %path.display(), error = %source, "corrupt cache entry treated as absent");
                None
            }
            Err(err) => return Err(err),
        };
        Ok(doc.and_then(|doc| {
            if self.expired_at(doc.written_at, Utc::now()) {
                None
            } else {
                Some(doc.payload)
            }
        }))
    }

    async fn store(&self, key: &Fingerprint, payload: &Payload) -> Result<(), CacheError> {
        let doc = CacheDocument {
            written_at: Utc::now(),
            payload: payload.clone(),
        };
        self.write_document(key, &doc).await?;
        debug!(key = %key, "cache entry written");
        Ok(())
    }

    async fn exists(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    async fn is_expired(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        Ok(match self.read_document(key).await? {
            Some(doc) => self.expired_at(doc.written_at, Utc::now()),
            None => false,
        })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
