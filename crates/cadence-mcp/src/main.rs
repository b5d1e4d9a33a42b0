mod adapter;
mod rpc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// stdio JSON-RPC 2.0 bridge onto the cadence bus. stdout carries the
/// protocol; all logging goes to stderr.
#[derive(Parser, Debug)]
#[command(name = "cadence-mcp")]
#[command(about = "Assistant adapter for the cadence coordination server")]
struct Cli {
    /// Bus WebSocket URL (defaults from MAIN_HOST/MAIN_PORT)
    #[arg(long)]
    url: Option<String>,

    /// Shared bus secret (AUTH_TOKEN)
    #[arg(long)]
    token: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let cli = Cli::parse();

    let url = cli.url.unwrap_or_else(|| {
        let host = env_var("MAIN_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env_var("MAIN_PORT").unwrap_or_else(|| "8180".to_string());
        format!("ws://{}:{}/ws", host, port)
    });
    let token = cli
        .token
        .or_else(|| env_var("AUTH_TOKEN"))
        .ok_or_else(|| anyhow::anyhow!("AUTH_TOKEN is required (flag or environment)"))?;

    // Exits 0 when either side of the bridge closes.
    adapter::run(&url, &token).await
}
