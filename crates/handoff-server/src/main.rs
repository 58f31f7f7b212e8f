// Handoff server - shared in-memory handoff store on loopback
//
// Normally started in the background by a client that found no server in
// its port range; can also be run by hand.

use anyhow::{Context, Result};
use clap::Parser;
use handoff_server::server::ttl_from_millis;
use handoff_server::{start_server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handoff-server")]
#[command(about = "Shared handoff store served over loopback HTTP")]
#[command(version)]
struct Cli {
    /// Port to bind on 127.0.0.1
    #[arg(short, long, default_value_t = 1099)]
    port: u16,

    /// Shut down after this many milliseconds without requests (0 = never).
    /// Overrides HANDOFF_SERVER_TTL.
    #[arg(long)]
    ttl_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env(cli.port);
    if let Some(ttl_ms) = cli.ttl_ms {
        config.idle_ttl = ttl_from_millis(ttl_ms);
    }

    info!(
        "Starting handoff server v{} (max {} handoffs)",
        env!("CARGO_PKG_VERSION"),
        config.limits.max_handoffs
    );

    start_server(config)
        .await
        .with_context(|| format!("Handoff server on port {} failed", cli.port))
}
