//! Domain types shared by every skycast crate.
//!
//! A feed is identified on the wire by its [`FeedId`]; what it carries is a
//! [`Payload`] stamped with an optional [`NominalTime`]; what the client
//! receives is an [`Envelope`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorTag;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identifier of one activated feed. Doubles as the `handler` field of
/// every delivered envelope and as the lookup key for `deactivate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(pub String);

impl FeedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FeedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The time a piece of data claims to represent, as opposed to the wall-clock
/// time it was fetched or written. Ordered; the scheduler only ever delivers
/// strictly newer nominal times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NominalTime(pub DateTime<Utc>);

/// Compact wire/cache format used by every upstream archive (`20240501_1805`).
pub const NOMINAL_FORMAT: &str = "%Y%m%d_%H%M";

impl NominalTime {
    pub fn parse_compact(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s.trim(), NOMINAL_FORMAT)
            .ok()
            .map(|naive| Self(Utc.from_utc_datetime(&naive)))
    }

    pub fn compact(&self) -> String {
        self.0.format(NOMINAL_FORMAT).to_string()
    }
}

impl fmt::Display for NominalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact())
    }
}

impl From<DateTime<Utc>> for NominalTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

// ---------------------------------------------------------------------------
// Feed kinds
// ---------------------------------------------------------------------------

/// Closed set of feed variants a client may activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    #[serde(alias = "level2radar")]
    RadarSweep,
    #[serde(alias = "obs")]
    SurfaceObs,
    #[serde(alias = "shapefile")]
    VectorLayer,
    #[serde(alias = "static")]
    StaticBundle,
}

impl FeedKind {
    pub fn all() -> [FeedKind; 4] {
        [
            FeedKind::RadarSweep,
            FeedKind::SurfaceObs,
            FeedKind::VectorLayer,
            FeedKind::StaticBundle,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::RadarSweep => "radar-sweep",
            FeedKind::SurfaceObs => "surface-obs",
            FeedKind::VectorLayer => "vector-layer",
            FeedKind::StaticBundle => "static-bundle",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `type` field names no known feed variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeedKind(pub String);

impl fmt::Display for UnknownFeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown feed type '{}'", self.0)
    }
}

impl std::error::Error for UnknownFeedKind {}

impl FromStr for FeedKind {
    type Err = UnknownFeedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radar-sweep" | "level2radar" => Ok(FeedKind::RadarSweep),
            "surface-obs" | "obs" => Ok(FeedKind::SurfaceObs),
            "vector-layer" | "shapefile" => Ok(FeedKind::VectorLayer),
            "static-bundle" | "static" => Ok(FeedKind::StaticBundle),
            other => Err(UnknownFeedKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads and envelopes
// ---------------------------------------------------------------------------

/// One fetched result: feed-specific JSON fields plus the nominal time used
/// for suppression. `nominal` is `None` only for feeds with no notion of data
/// time; those are delivered on every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<NominalTime>,
    pub body: Map<String, Value>,
}

impl Payload {
    pub fn new(nominal: Option<NominalTime>, body: Map<String, Value>) -> Self {
        Self { nominal, body }
    }

    /// Payload whose body is a single `key: value` field.
    pub fn single(nominal: Option<NominalTime>, key: impl Into<String>, value: Value) -> Self {
        let mut body = Map::new();
        body.insert(key.into(), value);
        Self { nominal, body }
    }
}

/// The unit handed to delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Data { handler: FeedId, body: Map<String, Value> },
    Error { handler: FeedId, tag: ErrorTag },
}

impl Envelope {
    pub fn data(handler: FeedId, payload: Payload) -> Self {
        Envelope::Data {
            handler,
            body: payload.body,
        }
    }

    pub fn error(handler: FeedId, tag: ErrorTag) -> Self {
        Envelope::Error { handler, tag }
    }

    pub fn handler(&self) -> &FeedId {
        match self {
            Envelope::Data { handler, .. } | Envelope::Error { handler, .. } => handler,
        }
    }

    /// JSON document sent to the client. `handler` always wins over a
    /// same-named body field.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Data { handler, body } => {
                let mut doc = body.clone();
                doc.insert("handler".to_string(), Value::String(handler.0.clone()));
                Value::Object(doc)
            }
            Envelope::Error { handler, tag } => serde_json::json!({
                "handler": handler.0,
                "error": tag.as_str(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
