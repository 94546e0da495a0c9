//! CLI entry point for subtrack.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Subscription tracker core CLI
#[derive(Parser, Debug)]
#[command(name = "subtrack", version, about = "subtrack: resilient subscription data core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the exchange rate once and print the resulting state
    Rate,
    /// Actively probe network connectivity
    Probe(ProbeArgs),
    /// Aggregate a JSON array of subscription records
    Summary(SummaryArgs),
}

/// Arguments for `subtrack probe`.
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// URL to probe (defaults to the configured probe URL)
    #[arg(long)]
    pub url: Option<String>,
}

/// Arguments for `subtrack summary`.
#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Path to a JSON file holding an array of records
    pub path: PathBuf,

    /// Use this rate instead of fetching one
    #[arg(long)]
    pub rate: Option<f64>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}
