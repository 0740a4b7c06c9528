use tokio::sync::watch;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockflow_ingest::MovementConsumer;
use stockflow_shared::{database, AppConfig, CacheManager};

mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockflow=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    config.validate().map_err(anyhow::Error::msg)?;
    info!("Configuration loaded");

    // Initialize database
    let pool = database::create_pool(&config.database).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database connected, migrations applied");

    // Initialize Redis cache
    let cache = CacheManager::connect(&config.cache).await?;

    // Start the event-processing pipeline
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = MovementConsumer::new(
        config.kafka.clone(),
        pool.clone(),
        cache.clone(),
        shutdown_rx,
    );
    let consumer_task = tokio::spawn(consumer.run());

    // Read path
    let app = http::router(http::AppState {
        pool: pool.clone(),
        cache,
    })
    .layer(
        TraceLayer::new_for_http()
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the consumer finish its in-flight message before closing the pool.
    info!("Shutting down, draining consumer");
    let _ = shutdown_tx.send(true);
    consumer_task.await?;
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
