// ============================================================================
// STOCKFLOW - PRODUCT & WAREHOUSE REGISTRY
// ============================================================================
// Module: ingest/src/repo/registry.rs
// Description: Insert-if-absent upserts for the identity tables
// ============================================================================

use sqlx::{Postgres, Transaction};

/// Make sure a product row exists. Products carry no attributes beyond their
/// id and are auto-created on first reference.
pub async fn ensure_product(
    tx: &mut Transaction<'_, Postgres>,
    product_id: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO products (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(product_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Make sure a warehouse row exists, same contract as [`ensure_product`].
pub async fn ensure_warehouse(
    tx: &mut Transaction<'_, Postgres>,
    warehouse_id: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO warehouses (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(warehouse_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
