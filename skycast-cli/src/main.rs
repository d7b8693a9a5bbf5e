//! skycast: live weather data push server.
//!
//! # Usage
//!
//! ```text
//! skycast serve [--config <file>] [--bind <ip>] [--port <n>] [--static-dir <dir>]
//!               [--data-dir <dir>] [--cache-dir <dir>] [--log-json]
//! skycast status [--url <base>] [--json]
//! skycast cache list [--cache-dir <dir>] [--ttl-secs <n>] [--json]
//! skycast cache prune [--cache-dir <dir>] [--ttl-secs <n>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{cache::CacheCommand, serve::ServeArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "skycast",
    version,
    about = "Push radar, observation and map feeds to WebSocket clients",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the push server in the foreground.
    Serve(ServeArgs),

    /// Show live counters from a running server.
    Status(StatusArgs),

    /// Inspect or prune the on-disk freshness cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Cache { command } => commands::cache::run(command),
    }
}
