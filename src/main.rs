// QuotaGuard - Main Entry Point
//
// Command-line front end for the guarded quote service:
// - Fetch batch quotes and symbol history through the guard
// - Report current usage
// - Serve Prometheus metrics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quotaguard::config::Config;
use quotaguard::{metrics, metrics_server, QuoteService};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// QuotaGuard: rate limit, budget and cache guard for a metered market-data API
#[derive(Parser, Debug)]
#[command(name = "quotaguard")]
#[command(author = "QuotaGuard Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Rate limit, monthly budget and result cache guard for market-data APIs", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a config file (default: ~/.config/quotaguard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch latest quotes for the configured symbols
    Quotes,
    /// Fetch daily history for one symbol (use BTC-USD for BTC/USD)
    History {
        /// Symbol to fetch
        symbol: String,
    },
    /// Show current minute and monthly usage
    Usage,
    /// Serve Prometheus metrics
    ServeMetrics {
        /// Port to listen on (default from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { config.log_level()? };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // Logs go to stderr so command output on stdout stays machine-readable
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config, args.verbose)?;
    debug!(?config, "Configuration loaded");

    match args.command {
        Some(Commands::Quotes) => {
            let service = QuoteService::from_config(&config).await?;
            print_json(&service.fetch_quotes().await?)?;
        }
        Some(Commands::History { symbol }) => {
            let service = QuoteService::from_config(&config).await?;
            print_json(&service.fetch_history(&symbol).await?)?;
        }
        Some(Commands::Usage) => {
            let service = QuoteService::from_config(&config).await?;
            print_json(&service.usage_snapshot().await)?;
        }
        Some(Commands::ServeMetrics { port }) => {
            let port = port.unwrap_or(config.metrics.port);
            metrics::init().context("Failed to initialize metrics")?;
            metrics_server::start_metrics_server(port).await?;
        }
        None => {
            info!("No command specified. Use \"quotaguard --help\" for usage.");
        }
    }

    Ok(())
}
