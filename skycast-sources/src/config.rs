//! Per-variant tuning, deserialised from the `sources` section of the server
//! config file.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which MDF column layout a network publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MdfDialect {
    /// Station rows carry LAT/LON, PALT and TDEW directly.
    Metar,
    /// Station rows carry RELH and PRES; location comes from the station table.
    Mesonet,
}

/// One observation network: its dialect and the URL templates fetched for
/// every candidate hour (chrono `strftime` placeholders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsNetwork {
    pub dialect: MdfDialect,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub static_refresh_secs: u64,
    pub vector_refresh_secs: u64,
    pub radar_refresh_secs: u64,
    pub radar_recent_minutes: u64,
    /// Base URL of the sweep extraction archive.
    pub radar_archive_url: String,
    pub obs_staleness_hours: u32,
    pub obs_release_minute: u32,
    pub obs_networks: BTreeMap<String, ObsNetwork>,
    pub http_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let mut obs_networks = BTreeMap::new();
        obs_networks.insert(
            "metar".to_string(),
            ObsNetwork {
                dialect: MdfDialect::Metar,
                urls: vec![
                    "http://www.mesonet.org/data/public/noaa/metar/archive/mdf/conus/%Y/%m/%d/%Y%m%d%H%M.mdf"
                        .to_string(),
                ],
            },
        );
        obs_networks.insert(
            "mesonet".to_string(),
            ObsNetwork {
                dialect: MdfDialect::Mesonet,
                urls: vec![
                    "http://www.mesonet.org/data/public/mesonet/mdf/%Y/%m/%d/%Y%m%d%H%M.mdf"
                        .to_string(),
                ],
            },
        );

        Self {
            static_refresh_secs: 3600,
            vector_refresh_secs: 30 * 24 * 3600,
            radar_refresh_secs: 60,
            radar_recent_minutes: 60,
            radar_archive_url: "http://127.0.0.1:8081/level2".to_string(),
            obs_staleness_hours: 3,
            obs_release_minute: 10,
            obs_networks,
            http_timeout_secs: 30,
        }
    }
}

impl SourcesConfig {
    pub fn static_refresh(&self) -> Duration {
        Duration::from_secs(self.static_refresh_secs)
    }

    pub fn vector_refresh(&self) -> Duration {
        Duration::from_secs(self.vector_refresh_secs)
    }

    pub fn radar_refresh(&self) -> Duration {
        Duration::from_secs(self.radar_refresh_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
