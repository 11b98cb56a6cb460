use std::env;

use anyhow::{ensure, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address peers use to reach this replica (host:port).
    /// Falls back to the SOCKET_ADDRESS environment variable.
    #[arg(long)]
    pub address: Option<String>,

    /// Comma-separated seed view, in the slot order shared by the whole
    /// cluster. Falls back to the VIEW environment variable.
    #[arg(long)]
    pub view: Option<String>,
}

/// Resolved bootstrap configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BootConfig {
    pub self_addr: String,
    pub seed: Vec<String>,
}

impl Cli {
    pub fn resolve(self) -> Result<BootConfig> {
        let self_addr = self
            .address
            .or_else(|| env::var("SOCKET_ADDRESS").ok())
            .context("replica address required (--address or SOCKET_ADDRESS)")?;
        let view = self
            .view
            .or_else(|| env::var("VIEW").ok())
            .context("seed view required (--view or VIEW)")?;
        let seed: Vec<String> = view
            .split(',')
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();
        ensure!(!seed.is_empty(), "seed view is empty");
        ensure!(
            seed.contains(&self_addr),
            "seed view must contain this replica's address ({self_addr})"
        );
        Ok(BootConfig { self_addr, seed })
    }
}
