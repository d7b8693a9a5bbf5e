//! `skycast status`: live counters from a running server.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use skycast_cache::age::format_datetime_age;
use skycast_server::StatusSnapshot;

/// Arguments for `skycast status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Base URL of the server.
    #[arg(long, env = "SKYCAST_URL", default_value = "http://127.0.0.1:8001")]
    pub url: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "counter")]
    name: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let url = format!("{}/status", self.url.trim_end_matches('/'));
        let snapshot: StatusSnapshot = ureq::get(&url)
            .timeout(Duration::from_secs(5))
            .call()
            .with_context(|| format!("failed to reach {url}"))?
            .into_json()
            .with_context(|| format!("unexpected response from {url}"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&self.url, &snapshot);
        Ok(())
    }
}

fn print_table(url: &str, snapshot: &StatusSnapshot) {
    let uptime = DateTime::from_timestamp(snapshot.started_at_unix as i64, 0)
        .map(format_datetime_age)
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "skycast {} | up {}",
        url.bold(),
        uptime.green()
    );

    let rows = vec![
        CounterRow {
            name: "connections",
            value: snapshot.connections.to_string(),
        },
        CounterRow {
            name: "subscriptions",
            value: snapshot.subscriptions.to_string(),
        },
        CounterRow {
            name: "armed timers",
            value: snapshot.armed_timers.to_string(),
        },
        CounterRow {
            name: "pending persist",
            value: pending_label(snapshot.pending_persist),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn pending_label(pending: usize) -> String {
    if pending == 0 {
        "0".to_string()
    } else {
        pending.to_string().yellow().to_string()
    }
}
