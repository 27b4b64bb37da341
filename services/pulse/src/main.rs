//! Pulse CLI
//!
//! Command-line interface for the endpoint monitoring and alerting service.

use std::path::PathBuf;

use clap::Parser;
use pulse::{load_config, PulseBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "HTTP endpoint uptime monitoring and alerting service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Status API port (overrides config file)
    #[arg(long)]
    status_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, status_port={:?}, log_level={:?}",
        args.config,
        args.status_port,
        args.log_level
    );

    tracing::debug!("Loading configuration from {:?}", args.config);
    let mut config = load_config(&args.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());

    if let Some(status_port) = args.status_port {
        config.status.port = status_port;
    }

    config.validate()?;

    tracing::info!("Starting pulse service");
    tracing::debug!(
        "Endpoints: {}, Notifiers: {}, Log store: {}",
        config.endpoints.len(),
        config.notifiers.len(),
        config.log_store.url
    );

    PulseBuilder::new(config).build().await?.start().await?;

    Ok(())
}
