//! subtrack CLI binary entry point.

use clap::Parser;
use subtrack::cli::{commands, Cli, Commands};
use subtrack::config::SubtrackConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match SubtrackConfig::load() {
        Ok(config) => match cli.command {
            Commands::Rate => commands::handle_rate(&config).await,
            Commands::Probe(args) => commands::handle_probe(&config, args).await,
            Commands::Summary(args) => commands::handle_summary(&config, args).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
