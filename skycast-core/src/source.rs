//! The Data Source contract and the construction seam.
//!
//! Every feed variant implements [`DataSource`]. The refresh loop owns one
//! boxed instance per subscription and drives it strictly sequentially:
//! `fetch` → (deliver) → `post_fetch` dispatch → `next_check_interval`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BuildError, FetchError};
use crate::params::Params;
use crate::types::{FeedId, FeedKind, Payload};

/// Detached persistence step returned by [`DataSource::post_fetch`]. Owns
/// everything it needs; runs after `fetch` has already returned.
pub type PersistJob = Pin<Box<dyn Future<Output = Result<(), FetchError>> + Send + 'static>>;

#[async_trait]
pub trait DataSource: Send {
    /// Stable feed id; `handler` of every envelope this source produces.
    fn id(&self) -> &FeedId;

    /// Produce the freshest payload. Only a `first_time` call may be answered
    /// from the expiring cache.
    async fn fetch(&mut self, first_time: bool) -> Result<Payload, FetchError>;

    /// Persistence side effect for the last successful fetch, if any.
    fn post_fetch(&mut self) -> Option<PersistJob> {
        None
    }

    /// Delay until the next cycle, computed from the current state and
    /// wall-clock time. Queried once per cycle.
    fn next_check_interval(&self) -> Duration;
}

/// Builds a Data Source from a feed kind and the remaining message fields.
pub trait SourceFactory: Send + Sync {
    fn build(&self, kind: FeedKind, params: &Params) -> Result<Box<dyn DataSource>, BuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        id: FeedId,
    }

    #[async_trait]
    impl DataSource for Fixed {
        fn id(&self) -> &FeedId {
            &self.id
        }

        async fn fetch(&mut self, _first_time: bool) -> Result<Payload, FetchError> {
            Ok(Payload::single(None, "value", serde_json::json!(1)))
        }

        fn next_check_interval(&self) -> Duration {
            Duration::from_secs(5)
        }
    }

    #[tokio::test]
    async fn default_post_fetch_has_no_side_effect() {
        let mut source: Box<dyn DataSource> = Box::new(Fixed {
            id: FeedId::from("fixed"),
        });
        let payload = source.fetch(true).await.expect("fetch");
        assert_eq!(payload.body["value"], serde_json::json!(1));
        assert!(source.post_fetch().is_none());
        assert_eq!(source.id().as_str(), "fixed");
    }
}
