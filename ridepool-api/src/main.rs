use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use ridepool_api::{
    app,
    state::{AppState, AuthConfig},
};
use ridepool_core::RideService;
use ridepool_store::app_config::Config;
use ridepool_store::{
    DbClient, EventProducer, InMemoryStore, PgBookingRepository, PgRideRepository, PgUserRepository,
    RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridepool_api=debug,ridepool_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting RidePool API on port {}", config.server.port);

    let service = match config.database.url.as_deref() {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            RideService::new(
                Arc::new(PgUserRepository::new(db.pool.clone())),
                Arc::new(PgRideRepository::new(db.pool.clone())),
                Arc::new(PgBookingRepository::new(db.pool.clone())),
                config.search.clone(),
            )
        }
        None => {
            tracing::warn!("No database.url configured; using the in-memory store");
            let store = Arc::new(InMemoryStore::new());
            RideService::new(store.clone(), store.clone(), store, config.search.clone())
        }
    };

    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(RedisClient::new(url).context("Invalid Redis URL")?)),
        None => {
            tracing::info!("No redis.url configured; rate limiting disabled");
            None
        }
    };

    let events = EventProducer::new(config.kafka.brokers.as_deref()).context("Failed to create event producer")?;

    let app_state = AppState {
        service,
        redis,
        events,
        auth: AuthConfig { secret: config.auth.jwt_secret.clone() },
        rate_limit: config.rate_limit.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
