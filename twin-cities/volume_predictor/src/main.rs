use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use flow_backend::TomTomClient;
use traffic_history::TrafficHistory;
use volume_predictor::{
    api::{self, AppState},
    config::ServiceConfig,
    model::TorchPredictor,
    FeatureWindow, ModelMeta, VolumePredictor,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServiceConfig::from_env()?;

    let meta = match &cfg.meta_path {
        Some(path) => ModelMeta::load(path)?,
        None => ModelMeta::default(),
    };
    let bounds = meta.scale_bounds()?;

    let predictor = TorchPredictor::load(&cfg.model_path)?;
    // Warmup to ensure JIT is happy
    let _ = predictor.predict(&FeatureWindow::zeros())?;
    tracing::info!("warmup forward ok");
    tracing::info!(
        "loaded model {}; feat_list[{}], volume range {}..{}",
        cfg.model_path,
        meta.feat_list.len(),
        meta.volume_min,
        meta.volume_max
    );

    let history = match &cfg.history_path {
        Some(path) => Some(Arc::new(TrafficHistory::from_path(path)?)),
        None => None,
    };

    let tomtom = match flow_backend::config::api_key_from_env()? {
        Some(key) => Some(Arc::new(
            TomTomClient::new(key, Duration::from_secs(10)).context("failed to build HTTP client")?,
        )),
        None => {
            tracing::info!("no API key configured; live routing disabled");
            None
        }
    };

    let state = AppState {
        predictor: Arc::new(predictor),
        bounds: Arc::new(bounds),
        volume_range: meta.volume_range(),
        route: cfg.route,
        history,
        tomtom,
        log_features: cfg.log_features,
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {}", e);
        }
        tracing::info!("shutting down");
    })
    .await?;
    Ok(())
}
