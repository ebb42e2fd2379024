use anyhow::Result;
use readings_service::{config::AppConfig, metrics_server, observability, router, SpaceStore};
use rental_meters::ReadingService;
use std::{net::SocketAddr, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = SpaceStore::connect(&cfg.store).await?;
    let service = Arc::new(ReadingService::new(store, cfg.recording.retry_policy()));

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = ?cfg.store.kind, "readings service listening");

    axum::serve(listener, router(service).into_make_service()).await?;

    Ok(())
}
