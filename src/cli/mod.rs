//! Command-line interface.

mod cache;
mod fetch;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use newsdesk::{Config, Domain};

#[derive(Parser, Debug)]
#[command(name = "newsdesk", version, about = "Two-tier market news cache")]
pub struct Cli {
    /// Config file (default: ~/.newsdesk/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the origin cache and paginated news API
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load one page through the client cache
    Fetch {
        /// Page number (1-4)
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Revalidate every cached page instead of serving from cache
        #[arg(long)]
        refresh: bool,
        /// News domain: global or domestic
        #[arg(long, default_value = "global")]
        domain: Domain,
        /// Origin server URL (overrides config)
        #[arg(long)]
        server: Option<String>,
        /// Return without waiting for the background prefetch
        #[arg(long)]
        no_wait: bool,
    },
    /// Inspect or reset the client cache snapshot
    Cache {
        #[command(subcommand)]
        action: CacheAction,
        /// News domain: global or domestic
        #[arg(long, default_value = "global", global = true)]
        domain: Domain,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cached pages and staleness
    Status,
    /// Drop cached pages and remove the snapshot
    Reset,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// `newsdesk=info` filter.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsdesk=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind, port } => serve::cmd_serve(config, bind, port).await,
        Commands::Fetch {
            page,
            refresh,
            domain,
            server,
            no_wait,
        } => fetch::cmd_fetch(config, page, refresh, domain, server, !no_wait).await,
        Commands::Cache { action, domain } => match action {
            CacheAction::Status => cache::cmd_cache_status(&config, domain),
            CacheAction::Reset => cache::cmd_cache_reset(&config, domain),
        },
    }
}
