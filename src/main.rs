use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shorty_edge::{metrics::Metrics, routes::router, EdgeService, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shorty_edge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shorty edge service");

    let config_path = std::env::var("CONFIG_PATH").ok();
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path);
    }
    let settings = Settings::load(config_path.as_deref())?;

    let metrics = Arc::new(Metrics::new()?);
    let service = EdgeService::from_settings(&settings, metrics)?;
    let app = router(service.state());

    let http_addr = settings.server.http_addr.parse::<SocketAddr>()?;
    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);
    info!(
        "Rate limit: {} requests per minute per client",
        settings.rate_limit.requests_per_minute
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    service.shutdown().await;
    info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
