//! OpenSASE Catalog - catalog request and review service

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_catalog::application::ports::{CatalogStore, EventPublisher, NullPublisher};
use opensase_catalog::config::AppConfig;
use opensase_catalog::http::{router, AppState};
use opensase_catalog::infrastructure::{InMemoryCatalogStore, NatsEventPublisher, PgCatalogStore};
use opensase_catalog::SlugAllocator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = AppConfig::from_env()?;

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsEventPublisher::connect(url).await {
            Ok(publisher) => {
                info!(%url, "publishing domain events to NATS");
                Arc::new(publisher)
            }
            Err(err) => {
                warn!(%url, error = %err, "NATS unavailable, domain events will be dropped");
                Arc::new(NullPublisher)
            }
        },
        None => Arc::new(NullPublisher),
    };

    match &config.database_url {
        Some(url) => {
            let store = PgCatalogStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            serve(Arc::new(store), events, &config).await
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            serve(Arc::new(InMemoryCatalogStore::new()), events, &config).await
        }
    }
}

async fn serve<S: CatalogStore + 'static>(store: Arc<S>, events: Arc<dyn EventPublisher>, config: &AppConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    let app = router(AppState::new(store, SlugAllocator::default(), events, shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("🚀 OpenSASE Catalog listening on {}", config.bind_address());
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown)).await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, cancelling in-flight commands");
    shutdown.cancel();
}
