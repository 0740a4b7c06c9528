// ============================================================================
// STOCKFLOW - PROCESSED-EVENT JOURNAL
// ============================================================================
// Module: ingest/src/repo/journal.rs
// Description: Idempotency gate keyed by the source message id
// ============================================================================

use sqlx::{Postgres, Transaction};

use crate::normalizer::NormalizedEvent;

/// True iff a journal row for this message id is committed, i.e. the
/// message's effects are already in the database. Redeliveries of a committed
/// message short-circuit on this check with no side effects.
pub async fn is_processed(
    tx: &mut Transaction<'_, Postgres>,
    message_id: &str,
) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM movement_events WHERE id = $1)")
        .bind(message_id)
        .fetch_one(&mut **tx)
        .await
}

/// Journal the event inside the coordinator's transaction.
///
/// The message id is the primary key, so two transactions racing on the same
/// redelivered message cannot both commit: the loser fails on the unique
/// constraint, rolls back, and sees `is_processed` on retry.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    event: &NormalizedEvent,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO movement_events \
             (id, movement_id, warehouse_id, event_type, timestamp, product_id, quantity, \
              message_id, message_source, message_time) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&event.message_id)
    .bind(&event.movement_id)
    .bind(&event.warehouse_id)
    .bind(event.kind)
    .bind(event.occurred_at)
    .bind(&event.product_id)
    .bind(event.quantity)
    .bind(&event.message_id)
    .bind(&event.message_source)
    .bind(event.message_time)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
