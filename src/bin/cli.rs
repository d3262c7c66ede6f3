//! ks-harvest CLI
//!
//! Local execution entry point for the three-stage harvester.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ks_harvest::{
    client::{KickstarterApi, TransportClient},
    config::Config,
    error::Result,
    pipeline,
    ratelimit::RateLimiter,
};

/// ks-harvest - Crowdfunding Project Harvester
#[derive(Parser, Debug)]
#[command(
    name = "ks-harvest",
    version,
    about = "Discovers, enriches and exports crowdfunding project data"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover projects for every search term and category pair
    Scrape,

    /// Fetch campaign details for discovered projects
    Details {
        /// Re-fetch every project, replacing stored details
        #[arg(long)]
        rescrape: bool,
    },

    /// Merge both stores into CSV and Arrow exports
    Export,

    /// Summarize the local stores
    Stats,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Build the API client shared by the network-bound stages.
fn build_api(config: &Config) -> Result<KickstarterApi> {
    let limiter = Arc::new(RateLimiter::from_millis(config.scraping.rate_limit_ms));
    let transport = TransportClient::new(&config.scraping, limiter)?;
    Ok(KickstarterApi::new(
        transport,
        config.scraping.session_refresh_interval,
        &config.search.sort,
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    log::info!("Configuration: {}", cli.config.display());

    match cli.command {
        Command::Scrape => {
            let api = build_api(&config)?;
            pipeline::run_scrape(&config, &api).await?;
        }

        Command::Details { rescrape } => {
            let api = build_api(&config)?;
            pipeline::run_details(&config, &api, rescrape).await?;
        }

        Command::Export => {
            pipeline::run_export(&config)?;
        }

        Command::Stats => {
            pipeline::run_stats(&config)?;
        }
    }

    Ok(())
}
