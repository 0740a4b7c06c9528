// ============================================================================
// STOCKFLOW - TRANSACTION COORDINATOR
// ============================================================================
// Module: ingest/src/processor.rs
// Description: Applies one normalized event as a single database transaction
// ============================================================================

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockflow_shared::CacheManager;

use crate::normalizer::NormalizedEvent;
use crate::repo::{journal, movement, registry, stock};

/// Result of applying an event whose transaction reached a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event's effects were committed and the cache was invalidated.
    Applied,
    /// A journal row already existed; nothing was written. The consumer
    /// treats this the same as success and advances the offset.
    AlreadyProcessed,
}

/// Failures that roll the transaction back. The classification decides
/// whether the consumer may advance the offset, so it happens here, at the
/// boundary where the error originates.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The event would violate the non-negative stock invariant. Fatal for
    /// this event: the partition stalls on it until an operator intervenes
    /// (or a dead-letter route is wired in ahead of the coordinator).
    #[error(transparent)]
    NegativeStock(stock::StockError),

    /// An I/O failure talking to the database. Retryable: the consumer backs
    /// off and the message is redelivered.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ProcessError {
    /// Transient errors are retried; everything else needs intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::Database(_))
    }
}

/// Apply one event: journal check, registry upserts, stock delta, movement
/// half, journal record, commit, then cache invalidation.
///
/// Everything up to the commit happens in one transaction; the invalidation
/// runs strictly after it so a concurrent read can never repopulate the cache
/// with pre-commit state.
pub async fn process_event(
    pool: &PgPool,
    cache: &CacheManager,
    event: &NormalizedEvent,
) -> Result<Outcome, ProcessError> {
    let mut tx = pool.begin().await?;

    if journal::is_processed(&mut tx, &event.message_id).await? {
        warn!(message_id = %event.message_id, "Event already processed, skipping");
        tx.rollback().await?;
        return Ok(Outcome::AlreadyProcessed);
    }

    registry::ensure_product(&mut tx, &event.product_id).await?;
    registry::ensure_warehouse(&mut tx, &event.warehouse_id).await?;

    let delta = event.signed_quantity();
    let stock_row = match stock::apply_delta(
        &mut tx,
        &event.warehouse_id,
        &event.product_id,
        delta,
    )
    .await
    {
        Ok(row) => row,
        Err(stock::StockError::Database(e)) => return Err(ProcessError::Database(e)),
        Err(e @ stock::StockError::NegativeStock { .. }) => {
            return Err(ProcessError::NegativeStock(e))
        }
    };
    debug!(
        warehouse_id = %event.warehouse_id,
        product_id = %event.product_id,
        delta,
        quantity = stock_row.quantity,
        "Stock updated"
    );

    let movement_row = movement::apply_half(&mut tx, event).await?;
    debug!(
        movement_id = %movement_row.id,
        kind = %event.kind,
        is_complete = movement_row.is_complete(),
        "Movement updated"
    );

    journal::record(&mut tx, event).await?;

    tx.commit().await?;
    info!(
        message_id = %event.message_id,
        movement_id = %event.movement_id,
        "Event processed and transaction committed"
    );

    cache
        .invalidate(&event.warehouse_id, &event.product_id, &event.movement_id)
        .await;

    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_stock_is_not_transient() {
        let err = ProcessError::NegativeStock(stock::StockError::NegativeStock {
            warehouse_id: "WH-1".to_string(),
            product_id: "prod-1".to_string(),
            current: 5,
            delta: -10,
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn test_database_errors_are_transient() {
        let err = ProcessError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }
}
