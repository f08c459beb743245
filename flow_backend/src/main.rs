use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use flow_backend::{
    config, run_refresh, serve_client, FeedConfig, FeedHub, LiveSource, RefreshSchedule,
    TomTomClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = FeedConfig::from_env()?;
    let api_key = config::require_api_key()?;
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".to_string());

    let mut client = TomTomClient::new(api_key, Duration::from_secs(cfg.http_timeout_secs))
        .context("failed to build HTTP client")?;
    if let Some(url) = &cfg.base_url {
        client = client.with_base_url(url.clone());
    }

    let schedule = RefreshSchedule::from_secs(cfg.refresh_secs);
    let hub = FeedHub::new(64);
    let (stop_tx, stop_rx) = watch::channel(false);

    let source = Arc::new(LiveSource { client, cfg });
    let refresher = tokio::spawn(run_refresh(source, schedule, hub.clone(), stop_rx));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind TCP listener at {}", bind_addr))?;
    tracing::info!("live feed listening on ws://{}", bind_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("client connected from {}", peer);
                    tokio::spawn(serve_client(stream, hub.clone()));
                }
                Err(e) => {
                    tracing::warn!("accept error: {}", e);
                    // small delay to avoid tight loop in case of persistent errors
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    let _ = stop_tx.send(true);
    refresher.await.context("refresh task panicked")?;
    Ok(())
}
