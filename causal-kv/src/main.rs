use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use causal_kv::cli::Cli;
use causal_kv::replica::Replica;
use causal_kv::server;
use causal_kv::transport::HttpTransport;
use causal_kv::view::ViewSeed;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Cli::parse().resolve()?;
    let port = config
        .self_addr
        .rsplit(':')
        .next()
        .context("replica address must be host:port")?;
    let bind_addr = format!("0.0.0.0:{port}");

    let transport = Arc::new(HttpTransport::new()?);
    let replica = Arc::new(Replica::new(
        config.self_addr.clone(),
        ViewSeed::new(config.seed),
        transport,
    )?);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("replica {} listening on {}", config.self_addr, bind_addr);

    // Announce after the listener is up, so peers that react to the
    // announcement (view convergence, state transfer) can reach us.
    let announcer = replica.clone();
    tokio::spawn(async move {
        announcer.announce().await;
    });

    server::serve(listener, replica).await
}
