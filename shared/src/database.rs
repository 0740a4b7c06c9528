// ============================================================================
// STOCKFLOW - DATABASE CONNECTION MANAGEMENT
// ============================================================================
// Module: shared/src/database.rs
// Description: Postgres connection pool construction and health checks
// ============================================================================

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Create the shared connection pool from configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .connect(&config.url)
        .await?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Execute a health check query against the pool.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS health_check")
        .fetch_one(pool)
        .await?;

    let health_value: i32 = row.try_get("health_check")?;
    Ok(health_value == 1)
}
