//! trackwire daemon: terminal-facing TCP gateway.
//!
//! Decoded events are logged as JSON documents; wire a real
//! [`trackwire::EventSink`] implementation here to feed the
//! device-management intake.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackwire::config::Cli;
use trackwire::{JsonLogSink, Server};

#[tokio::main]
async fn main() -> trackwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Cli::parse().into_config();
    let server = Server::bind(config, Arc::new(JsonLogSink)).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await
}
