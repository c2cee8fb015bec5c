//! `repo-file-sync check-config` - resolve and print the copy jobs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use filesync_core::{config, ResolvedConfig, SourceRepo};

use super::sync::DEFAULT_CONFIG;

/// Arguments for `repo-file-sync check-config`.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Path to the sync configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckConfigArgs {
    pub fn run(self) -> Result<ExitCode> {
        let resolved = config::load(&self.config)
            .with_context(|| format!("invalid configuration '{}'", self.config.display()))?;

        if self.json {
            print_json(&resolved)?;
        } else {
            print_table(&resolved);
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Rule values may be secrets; only names are shown.
#[derive(Serialize)]
struct ConfigJson<'a> {
    sources: &'a [SourceRepo],
    rules: Vec<&'a str>,
    lookback_days: Option<u32>,
}

fn print_json(resolved: &ResolvedConfig) -> Result<()> {
    let payload = ConfigJson {
        sources: &resolved.sources,
        rules: resolved.rules.iter().map(|r| r.name.as_str()).collect(),
        lookback_days: resolved.lookback_days,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize configuration")?
    );
    Ok(())
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "src")]
    src: String,
    #[tabled(rename = "dest")]
    dest: String,
}

fn print_table(resolved: &ResolvedConfig) {
    println!(
        "{} {} source(s) | {} mapping(s) | {} substitution rule(s)",
        "✓".green(),
        resolved.sources.len(),
        resolved.file_count(),
        resolved.rules.len(),
    );
    if let Some(days) = resolved.lookback_days {
        println!("related pull requests: last {days} day(s)");
    }

    let rows: Vec<JobRow> = resolved
        .sources
        .iter()
        .flat_map(|source| {
            source.files.iter().map(move |mapping| JobRow {
                source: source.label(),
                src: mapping.src.display().to_string(),
                dest: mapping.dest.display().to_string(),
            })
        })
        .collect();
    if rows.is_empty() {
        println!("No files configured.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
