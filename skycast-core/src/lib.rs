//! skycast core library: feed identity, payloads, errors, Data Source contract.
//!
//! - [`types`]: feed ids, feed kinds, nominal times, payloads and envelopes
//! - [`error`]: [`FetchError`] taxonomy and [`BuildError`]
//! - [`params`]: typed access to activate-message parameters
//! - [`source`]: the [`DataSource`] and [`SourceFactory`] traits

pub mod error;
pub mod params;
pub mod source;
pub mod types;

pub use error::{BuildError, ErrorTag, FetchError, FetchOutcomeKind};
pub use params::Params;
pub use source::{DataSource, PersistJob, SourceFactory};
pub use types::{Envelope, FeedId, FeedKind, NominalTime, Payload};
