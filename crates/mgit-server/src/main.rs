use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mgit_server::{MgitServer, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Reference MGit repository server.
#[derive(Parser)]
#[command(name = "mgit-server", version, about)]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config.
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    MgitServer::new(config)?.serve().await?;
    Ok(())
}
