//! Colmap server binary
//!
//! Starts the HTTP server for asynchronous column-mapping extractions.

use anyhow::Context;
use clap::Parser;
use colmap_server::{config::ServerConfig, start_server};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Colmap - LLM-assisted column mapping for tabular files
#[derive(Parser, Debug)]
#[command(name = "colmap-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, env = "COLMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the LLM model
    #[arg(short, long, env = "COLMAP_MODEL")]
    model: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            tracing::warn!("No config file specified, using defaults");
            ServerConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }

    start_server(config).await?;
    Ok(())
}
