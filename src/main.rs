//! Stand-alone gateway binary.
//!
//! Runs an echo gateway: every frame a client sends is queued straight back
//! to it. Useful for soak-testing the connection layer and as a template for
//! embedding [`gatewire::GateServer`] behind real handlers.

mod cli;

use std::{error::Error, net::SocketAddr};

use clap::Parser;
use gatewire::{
    ConnectionHooks,
    GateServer,
    Settings,
    config::LoggingSettings,
    logging,
};
use log::info;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = cli::Cli::parse();
    let settings = load_settings(&cli)?;
    logging::init(&settings.logging)?;

    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let addr: SocketAddr = settings.server.bind_address.parse()?;
    let hooks = ConnectionHooks::new()
        .on_connect(|conn| info!("client connected: id={}", conn.id()))
        .on_receive(|_conn, payload, _kind| Ok(Some(payload)))
        .on_disconnect(|conn| {
            info!(
                "client disconnected: id={}, reason={:?}",
                conn.id(),
                conn.close_reason()
            );
        });
    let server = GateServer::new(settings.server_config(), hooks.into_handler()).bind(addr)?;
    info!("starting gateway: addr={addr}");
    server.run().await?;
    Ok(())
}

/// Merge the settings file (if any) with command-line overrides.
fn load_settings(cli: &cli::Cli) -> Result<Settings, BoxError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(addr) = cli.addr {
        settings.server.bind_address = addr.to_string();
    }
    if let Some(workers) = cli.workers {
        settings.server.workers = Some(workers);
    }
    if let Some(secs) = cli.heartbeat_secs {
        settings.connection.heartbeat_interval_ms = secs.saturating_mul(1000);
    }
    if let Some(len) = cli.max_frame_length {
        settings.connection.max_frame_length = len;
    }
    settings.logging = LoggingSettings {
        level: cli.log_level.clone().unwrap_or(settings.logging.level),
        json: cli.json || settings.logging.json,
    };
    Ok(settings)
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: SocketAddr) -> Result<(), BoxError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!("serving metrics: addr={addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: SocketAddr) -> Result<(), BoxError> {
    log::warn!("metrics disabled at build time, ignoring --metrics-addr {addr}");
    Ok(())
}
