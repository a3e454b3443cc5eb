//! Relay server binary.
//!
//! Configuration comes from `RELAY_*` environment variables; the flags below
//! override them.

use clap::Parser;
use relay_proxy::{run_server, ProviderKind, ServerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "relay-proxy")]
#[command(about = "Backend-for-frontend relay: chat completions and real-time WebSocket chat", long_about = None)]
#[command(version)]
struct Cli {
    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Completion backend for the default model (echo or ollama)
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Model served when a request does not name one
    #[arg(long)]
    default_model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay_proxy=info,relay_core=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut config = ServerConfig::from_env().map_err(anyhow::Error::msg)?;

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(model) = cli.default_model {
        config.default_model = model;
    }

    run_server(config).await
}
