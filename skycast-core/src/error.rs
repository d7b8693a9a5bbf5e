//! Error types for skycast-core.
//!
//! [`FetchError`] is the single error surface of a Data Source fetch. The
//! refresh loop never propagates it; it classifies it with
//! [`FetchError::classify`] and either suppresses the cycle or delivers an
//! error envelope tagged with [`ErrorTag`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::NominalTime;

/// Everything that can go wrong while fetching one payload.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable candidate existed within the source's staleness bound.
    #[error("stale data: {reason}")]
    Stale { reason: String },

    /// The best candidate is not newer than what was last served.
    #[error("no new data since {since}")]
    NoNewData { since: NominalTime },

    /// Local file access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The upstream could not be reached or the transfer failed.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The upstream answered with an unexpected status.
    #[error("upstream {url} returned status {status}")]
    Upstream { url: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream data had an unexpected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The expiring cache failed underneath a fetch or persist step.
    #[error("cache error: {0}")]
    Cache(String),
}

/// Coarse classification used by the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcomeKind {
    Stale,
    NoNewData,
    Internal,
}

impl FetchError {
    pub fn stale(reason: impl Into<String>) -> Self {
        FetchError::Stale {
            reason: reason.into(),
        }
    }

    pub fn transport(url: impl Into<String>, err: impl fmt::Display) -> Self {
        FetchError::Transport {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn classify(&self) -> FetchOutcomeKind {
        match self {
            FetchError::Stale { .. } => FetchOutcomeKind::Stale,
            FetchError::NoNewData { .. } => FetchOutcomeKind::NoNewData,
            _ => FetchOutcomeKind::Internal,
        }
    }

    /// Tag shown to the client, or `None` when the cycle is suppressed.
    pub fn tag(&self) -> Option<ErrorTag> {
        match self.classify() {
            FetchOutcomeKind::Stale => Some(ErrorTag::StaleData),
            FetchOutcomeKind::Internal => Some(ErrorTag::Internal),
            FetchOutcomeKind::NoNewData => None,
        }
    }
}

/// Convenience constructor for [`FetchError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.into(),
        source,
    }
}

/// Client-visible error tag. Carries no internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    StaleData,
    Internal,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::StaleData => "stale data",
            ErrorTag::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data Source construction failures. Reported as protocol errors; no
/// subscription is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing required parameter '{param}'")]
    Missing { param: String },

    #[error("invalid parameter '{param}': {reason}")]
    Invalid { param: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_and_internal_map_to_client_tags() {
        assert_eq!(FetchError::stale("3h exhausted").tag(), Some(ErrorTag::StaleData));
        assert_eq!(
            FetchError::Parse("bad header".into()).tag(),
            Some(ErrorTag::Internal)
        );
        assert_eq!(
            FetchError::Upstream {
                url: "http://x".into(),
                status: 500
            }
            .tag(),
            Some(ErrorTag::Internal)
        );
    }

    #[test]
    fn no_new_data_is_suppressed_not_stale() {
        let since = NominalTime::parse_compact("20240501_1800").expect("time");
        let err = FetchError::NoNewData { since };
        assert_eq!(err.classify(), FetchOutcomeKind::NoNewData);
        assert_eq!(err.tag(), None);
    }

    #[test]
    fn internal_tag_does_not_leak_detail() {
        let err = io_err("/data/l2/secret.json", std::io::Error::other("disk gone"));
        let tag = err.tag().expect("tag");
        assert_eq!(tag.to_string(), "internal error");
        assert!(err.to_string().contains("secret.json"));
    }
}
