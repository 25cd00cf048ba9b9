//! Command line interface for the `gatewire` gateway binary.
//!
//! Flags override values loaded from the optional TOML settings file.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command line arguments for the `gatewire` binary.
#[derive(Debug, Parser)]
#[command(name = "gatewire", version, about = "Long-connection gateway")]
pub struct Cli {
    /// TOML settings file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Address to accept client connections on.
    #[arg(short, long, value_name = "ADDR")]
    pub addr: Option<SocketAddr>,
    /// Number of accept workers.
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Heartbeat period in seconds; 0 disables liveness checks.
    #[arg(long, value_name = "SECS")]
    pub heartbeat_secs: Option<u64>,
    /// Largest accepted frame payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_length: Option<usize>,
    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Log JSON lines.
    #[arg(long)]
    pub json: bool,
}
