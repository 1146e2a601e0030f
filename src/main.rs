//! # yt-relay - Main Entry Point
//!
//! `yt-relay serve` loads configuration (a YAML file, or environment
//! variables when no file is given), seeds the allow-list from the CMS and
//! serves the relay until SIGINT/SIGTERM.
//!
//! `yt-relay check-config` only loads and validates the configuration.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use yt_relay::observability::{init_logging, install_recorder};
use yt_relay::{GatewayConfig, RelayServer};

#[derive(Parser)]
#[command(name = "yt-relay")]
#[command(about = "Caching, allow-listing relay for the YouTube Data API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve(ServeArgs),
    /// Validate the configuration and exit
    CheckConfig(ConfigArgs),
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// YAML configuration file; environment variables are used when omitted
    #[arg(short, long, env = "YT_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Bind address, overrides the configuration
    #[arg(long)]
    address: Option<String>,

    /// Bind port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::CheckConfig(args) => check_config(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = GatewayConfig::load(args.config.config.as_deref())
        .await
        .context("failed to load configuration")?;
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    init_logging(&config.logging)?;
    let metrics = install_recorder()?;

    info!(version = env!("CARGO_PKG_VERSION"), app_name = %config.app_name, "starting yt-relay");

    let server = RelayServer::new(&config, Some(metrics))
        .await
        .context("failed to start yt-relay")?;
    server.run().await?;
    Ok(())
}

async fn check_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = GatewayConfig::load(args.config.as_deref())
        .await
        .context("configuration is invalid")?;

    println!("configuration is valid");
    println!("  app name:  {}", config.app_name);
    println!("  bind:      {}", config.bind_address()?);
    println!("  cache:     {}", if config.cache.enabled { "enabled" } else { "disabled" });
    if let Some(redis) = &config.redis {
        println!("  redis:     {}", redis.topology()?.name());
    }
    println!("  channels:  {}", config.whitelists.channel_ids.len());
    Ok(())
}
