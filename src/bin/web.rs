//! Web form for downloading a single video or its audio.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clipfetch::web::{self, WebState};
use clipfetch::{Config, logging};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("reading configuration")?;
    tokio::fs::create_dir_all(&config.files_dir)
        .await
        .with_context(|| format!("creating {}", config.files_dir.display()))?;

    let state = WebState {
        engine: Arc::new(config.engine()),
        files_dir: config.files_dir.clone(),
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, files = %config.files_dir.display(), "web form listening");

    axum::serve(listener, web::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running web server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
