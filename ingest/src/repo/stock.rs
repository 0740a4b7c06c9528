// ============================================================================
// STOCKFLOW - STOCK LEDGER
// ============================================================================
// Module: ingest/src/repo/stock.rs
// Description: Row-locked stock updates with the non-negativity invariant
// ============================================================================

use sqlx::{Postgres, Transaction};
use thiserror::Error;

use stockflow_shared::models::WarehouseStock;

#[derive(Debug, Error)]
pub enum StockError {
    #[error(
        "cannot reduce stock below zero for warehouse {warehouse_id} and product {product_id}: \
         current stock {current}, attempted change {delta}"
    )]
    NegativeStock {
        warehouse_id: String,
        product_id: String,
        current: i64,
        delta: i64,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Quantity after applying `delta` to an existing level, or `None` when the
/// result would be negative. A missing row behaves like a level of zero:
/// a row may only be initialized by a non-negative delta.
fn next_quantity(current: Option<i64>, delta: i64) -> Option<i64> {
    let next = current.unwrap_or(0) + delta;
    (next >= 0).then_some(next)
}

/// Apply a signed delta to the (warehouse, product) stock level.
///
/// The existing row is locked with `SELECT ... FOR UPDATE` so two concurrent
/// transactions touching the same pair serialize; only one row is ever locked
/// per call, so unrelated pairs cannot deadlock. A delta that would leave the
/// level negative fails the transaction: it means an out-of-order delivery or
/// corrupt upstream data, and the offset must not advance past it.
pub async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    warehouse_id: &str,
    product_id: &str,
    delta: i64,
) -> Result<WarehouseStock, StockError> {
    let current: Option<i64> = sqlx::query_scalar(
        "SELECT quantity FROM warehouse_stocks \
         WHERE warehouse_id = $1 AND product_id = $2 \
         FOR UPDATE",
    )
    .bind(warehouse_id)
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?;

    let next = next_quantity(current, delta).ok_or_else(|| StockError::NegativeStock {
        warehouse_id: warehouse_id.to_string(),
        product_id: product_id.to_string(),
        current: current.unwrap_or(0),
        delta,
    })?;

    let row = if current.is_some() {
        sqlx::query_as::<_, WarehouseStock>(
            "UPDATE warehouse_stocks SET quantity = $3 \
             WHERE warehouse_id = $1 AND product_id = $2 \
             RETURNING warehouse_id, product_id, quantity",
        )
        .bind(warehouse_id)
        .bind(product_id)
        .bind(next)
        .fetch_one(&mut **tx)
        .await?
    } else {
        sqlx::query_as::<_, WarehouseStock>(
            "INSERT INTO warehouse_stocks (warehouse_id, product_id, quantity) \
             VALUES ($1, $2, $3) \
             RETURNING warehouse_id, product_id, quantity",
        )
        .bind(warehouse_id)
        .bind(product_id)
        .bind(next)
        .fetch_one(&mut **tx)
        .await?
    };

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(100), -30, Some(70))]
    #[case(Some(5), -5, Some(0))]
    #[case(Some(5), -10, None)]
    #[case(Some(0), 25, Some(25))]
    #[case(None, 100, Some(100))]
    #[case(None, 0, Some(0))]
    #[case(None, -1, None)]
    fn test_next_quantity(
        #[case] current: Option<i64>,
        #[case] delta: i64,
        #[case] expected: Option<i64>,
    ) {
        assert_eq!(next_quantity(current, delta), expected);
    }

    #[test]
    fn test_negative_stock_error_names_the_pair() {
        let err = StockError::NegativeStock {
            warehouse_id: "WH-1".to_string(),
            product_id: "prod-9".to_string(),
            current: 5,
            delta: -10,
        };
        let message = err.to_string();
        assert!(message.contains("WH-1"));
        assert!(message.contains("prod-9"));
        assert!(message.contains("current stock 5"));
    }
}
