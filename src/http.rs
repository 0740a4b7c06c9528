// ============================================================================
// STOCKFLOW - HTTP READ PATH
// ============================================================================
// Module: src/http.rs
// Description: Cache-aside read endpoints for stock levels and movements
// ============================================================================

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error};

use stockflow_shared::models::{Movement, MovementDetail, WarehouseStock};
use stockflow_shared::{cache, database, CacheManager, Error};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: CacheManager,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/movements/:movement_id", get(get_movement))
        .route(
            "/api/warehouses/:warehouse_id/products/:product_id",
            get(get_warehouse_product_stock),
        )
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Wrapper so shared errors render as the API error shape. Internal errors
/// are logged and collapsed to a generic detail with no state leakage.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self(Error::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
            "An unexpected error occurred".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Detail view of one movement. Cache-aside over the `movement:{id}` key the
/// event pipeline invalidates.
async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<String>,
) -> Result<Json<MovementDetail>, ApiError> {
    let key = cache::movement_key(&movement_id);
    if let Some(cached) = state.cache.get::<MovementDetail>(&key).await {
        debug!(movement_id = %movement_id, "Cache hit for movement");
        return Ok(Json(cached));
    }

    let movement: Option<Movement> = sqlx::query_as("SELECT * FROM movements WHERE id = $1")
        .bind(&movement_id)
        .fetch_optional(&state.pool)
        .await?;

    let movement = movement
        .ok_or_else(|| Error::NotFound(format!("Movement with ID {} not found", movement_id)))?;

    let detail = MovementDetail::from(movement);
    state.cache.set(&key, &detail).await;
    Ok(Json(detail))
}

/// Current stock of a product at a warehouse. Cache-aside over the
/// `stock:{warehouse}:{product}` key the event pipeline invalidates.
async fn get_warehouse_product_stock(
    State(state): State<AppState>,
    Path((warehouse_id, product_id)): Path<(String, String)>,
) -> Result<Json<WarehouseStock>, ApiError> {
    let key = cache::stock_key(&warehouse_id, &product_id);
    if let Some(cached) = state.cache.get::<WarehouseStock>(&key).await {
        debug!(warehouse_id = %warehouse_id, product_id = %product_id, "Cache hit for stock");
        return Ok(Json(cached));
    }

    let stock: Option<WarehouseStock> = sqlx::query_as(
        "SELECT warehouse_id, product_id, quantity FROM warehouse_stocks \
         WHERE warehouse_id = $1 AND product_id = $2",
    )
    .bind(&warehouse_id)
    .bind(&product_id)
    .fetch_optional(&state.pool)
    .await?;

    let stock = stock.ok_or_else(|| {
        Error::NotFound(format!(
            "Stock not found for warehouse {} and product {}",
            warehouse_id, product_id
        ))
    })?;

    state.cache.set(&key, &stock).await;
    Ok(Json(stock))
}

async fn health(State(state): State<AppState>) -> Response {
    match database::health_check(&state.pool).await {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response(),
        Ok(false) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded"})),
        )
            .into_response(),
    }
}
