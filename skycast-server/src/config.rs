//! Server configuration: YAML file, then command-line overrides.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use skycast_sources::SourcesConfig;

use crate::error::{io_err, ServerError};

pub const DEFAULT_CONFIG_FILE: &str = "skycast.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub static_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    /// How long shutdown waits for outstanding cache writes.
    pub persist_drain_secs: u64,
    pub heartbeat_secs: u64,
    /// Envelopes queued per connection before delivery back-pressures.
    pub outbound_buffer: usize,
    /// A client whose socket accepts nothing for this long is dropped.
    pub send_timeout_secs: u64,
    pub log_level: String,
    pub log_json: bool,
    pub sources: SourcesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8001,
            static_dir: PathBuf::from("static"),
            data_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("data/cache"),
            cache_ttl_secs: 300,
            persist_drain_secs: 10,
            heartbeat_secs: 300,
            outbound_buffer: 256,
            send_timeout_secs: 10,
            log_level: "info".to_string(),
            log_json: false,
            sources: SourcesConfig::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl ServerConfig {
    /// Load `path`, or `skycast.yaml` in the working directory when `path`
    /// is `None`. Only the implicit default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        Self::from_yaml(&contents).map_err(|source| ServerError::Config { path, source })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(dir) = overrides.static_dir {
            self.static_dir = dir;
        }
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(dir) = overrides.cache_dir {
            self.cache_dir = dir;
        }
        self.log_json |= overrides.log_json;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn persist_drain(&self) -> Duration {
        Duration::from_secs(self.persist_drain_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
