//! # skycast-sources
//!
//! Concrete Data Sources and the closed feed registry that builds them.
//!
//! Each variant implements [`skycast_core::DataSource`]. Remote variants
//! (`radar-sweep`, `surface-obs`) walk their candidates newest to oldest via
//! [`retry::seek_freshest`]; local variants (`static-bundle`,
//! `vector-layer`) read one JSON document and key freshness off its mtime.

pub mod config;
pub mod context;
pub mod encode;
pub mod local;
pub mod mdf;
pub mod radar_sweep;
pub mod registry;
pub mod retry;
pub mod static_bundle;
pub mod stations;
pub mod surface_obs;
pub mod upstream;
pub mod vector_layer;

pub use config::{MdfDialect, ObsNetwork, SourcesConfig};
pub use context::{Clock, SourceContext};
pub use registry::FeedRegistry;
pub use stations::{StationLocation, StationTable};
pub use upstream::{Download, HttpUpstream, Upstream};

#[cfg(test)]
pub(crate) mod testing;
