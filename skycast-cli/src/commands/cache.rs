//! `skycast cache`: inspect and prune the on-disk freshness cache.
//!
//! The server never deletes entries; expired ones are only treated as
//! absent. `prune` is the explicit cleanup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use skycast_cache::age::{format_datetime_age, format_duration};
use skycast_cache::{EntryInfo, ExpiringCache, FileCache};
use skycast_server::ServerConfig;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cache entries with their age and expiry.
    List(CacheArgs),

    /// Delete expired entries.
    Prune(CacheArgs),
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// YAML config file supplying `cache_dir` and `cache_ttl_secs`.
    #[arg(long, env = "SKYCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory; overrides the config file.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Entry lifetime in seconds; overrides the config file.
    #[arg(long)]
    pub ttl_secs: Option<u64>,

    /// Emit machine-readable JSON (list only).
    #[arg(long)]
    pub json: bool,
}

impl CacheArgs {
    fn open(&self) -> Result<FileCache> {
        let config =
            ServerConfig::load(self.config.as_deref()).context("failed to load server config")?;
        let root = self.cache_dir.clone().unwrap_or(config.cache_dir);
        let ttl = self.ttl_secs.unwrap_or(config.cache_ttl_secs);
        Ok(FileCache::new(root, Duration::from_secs(ttl)))
    }
}

pub fn run(command: CacheCommand) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    match command {
        CacheCommand::List(args) => {
            let cache = args.open()?;
            let entries = runtime
                .block_on(cache.entries())
                .with_context(|| format!("failed to read {}", cache.root().display()))?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries)
                        .context("failed to serialize cache listing")?
                );
                return Ok(());
            }
            print_table(&cache, entries);
            Ok(())
        }
        CacheCommand::Prune(args) => {
            let cache = args.open()?;
            let removed = runtime
                .block_on(cache.prune_expired())
                .with_context(|| format!("failed to prune {}", cache.root().display()))?;
            println!(
                "Pruned {} expired {} from {}",
                removed,
                if removed == 1 { "entry" } else { "entries" },
                cache.root().display()
            );
            Ok(())
        }
    }
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "nominal")]
    nominal: String,
    #[tabled(rename = "written")]
    written: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "state")]
    state: String,
}

fn print_table(cache: &FileCache, entries: Vec<EntryInfo>) {
    let expired = entries.iter().filter(|e| e.expired).count();
    println!(
        "{} | {} entries | {} expired | ttl {}",
        cache.root().display(),
        entries.len(),
        expired,
        format_duration(cache.ttl()),
    );
    if entries.is_empty() {
        println!("No cache entries.");
        return;
    }

    let rows: Vec<EntryRow> = entries
        .into_iter()
        .map(|entry| EntryRow {
            key: entry.key.to_string(),
            nominal: entry
                .nominal
                .map(|n| n.compact())
                .unwrap_or_else(|| "-".to_string()),
            written: format!("{} ago", format_datetime_age(entry.written_at)),
            size: format!("{} B", entry.size_bytes),
            state: if entry.expired {
                "EXPIRED".yellow().bold().to_string()
            } else {
                "FRESH".green().bold().to_string()
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if expired > 0 {
        println!("Run 'skycast cache prune' to delete expired entries.");
    }
}
