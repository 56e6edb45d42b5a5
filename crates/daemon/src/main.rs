// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hived: the Hive control-plane daemon.

use hive_daemon::orchestrator::Collaborators;
use hive_daemon::{listener, Config, Orchestrator};
use hive_core::SystemClock;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(bind = %config.bind_addr, "hived starting");

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        SystemClock,
        Collaborators::default(),
    ));
    orchestrator.start();

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let serve = tokio::spawn(listener::serve_ws(
        listener,
        orchestrator.store().clone(),
        orchestrator.connections().clone(),
        orchestrator.ingest().clone(),
        orchestrator.shutdown_token(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    orchestrator.stop();
    serve.abort();
    Ok(())
}
