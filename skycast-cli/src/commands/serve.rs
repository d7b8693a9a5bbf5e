//! `skycast serve`: run the server until ctrl-c or SIGTERM.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use skycast_server::{start_blocking, ConfigOverrides, ServerConfig};

/// Arguments for `skycast serve`. Flags override the config file.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// YAML config file. Defaults to `skycast.yaml` when present.
    #[arg(long, env = "SKYCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long, env = "SKYCAST_BIND")]
    pub bind: Option<IpAddr>,

    /// Port to listen on.
    #[arg(long, short, env = "SKYCAST_PORT")]
    pub port: Option<u16>,

    /// Directory holding static bundles and the station table.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Directory holding vector layers.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory of the freshness cache.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let config = ServerConfig::load(self.config.as_deref())
            .context("failed to load server config")?
            .apply(self.overrides());
        start_blocking(config).context("server exited with an error")
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind,
            port: self.port,
            static_dir: self.static_dir.clone(),
            data_dir: self.data_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            log_json: self.log_json,
        }
    }
}
