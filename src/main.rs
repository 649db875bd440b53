//! Storefront - checkout and order-fulfillment service

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use storefront::config::{Config, LogFormat};
use storefront::http::{router, AppState};
use storefront::notify::{LogNotifier, NatsNotifier, Notifier};
use storefront::services::{CartService, Services};
use storefront::store::{MemoryStore, PgStore, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init(),
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match NatsNotifier::connect(url).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let services = Services::new(store, notifier, &config);
    spawn_cart_sweep(services.carts.clone(), Duration::from_secs(config.cart_sweep_interval_secs));

    let app = router(AppState::new(services));
    tracing::info!("🚀 Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}

fn spawn_cart_sweep(carts: CartService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = carts.purge_expired(Utc::now()).await {
                tracing::warn!(error = %e, "guest cart sweep failed");
            }
        }
    });
}
