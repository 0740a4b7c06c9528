// ============================================================================
// STOCKFLOW - MOVEMENT PAIRING STORE
// ============================================================================
// Module: ingest/src/repo/movement.rs
// Description: Assembles movement rows from departure/arrival half-events
// ============================================================================

use sqlx::{Postgres, Transaction};

use stockflow_shared::models::{EventKind, Movement};

use crate::normalizer::NormalizedEvent;

/// Upsert the movement for one half-event and recompute the derived fields.
///
/// Departure and arrival may arrive in either order, on any partition; the
/// two halves are treated symmetrically. A repeated half overwrites only its
/// own field group (last write wins), leaving the other half intact.
/// `product_id` is fixed by whichever event created the row.
pub async fn apply_half(
    tx: &mut Transaction<'_, Postgres>,
    event: &NormalizedEvent,
) -> sqlx::Result<Movement> {
    sqlx::query("INSERT INTO movements (id, product_id) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(&event.movement_id)
        .bind(&event.product_id)
        .execute(&mut **tx)
        .await?;

    let mut movement: Movement = sqlx::query_as("SELECT * FROM movements WHERE id = $1 FOR UPDATE")
        .bind(&event.movement_id)
        .fetch_one(&mut **tx)
        .await?;

    apply_half_fields(&mut movement, event);
    recompute_derived(&mut movement);

    let updated: Movement = sqlx::query_as(
        "UPDATE movements SET \
             source_warehouse_id = $2, \
             departure_timestamp = $3, \
             departure_quantity = $4, \
             destination_warehouse_id = $5, \
             arrival_timestamp = $6, \
             arrival_quantity = $7, \
             transfer_time = $8, \
             quantity_difference = $9, \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(&movement.id)
    .bind(&movement.source_warehouse_id)
    .bind(movement.departure_timestamp)
    .bind(movement.departure_quantity)
    .bind(&movement.destination_warehouse_id)
    .bind(movement.arrival_timestamp)
    .bind(movement.arrival_quantity)
    .bind(movement.transfer_time)
    .bind(movement.quantity_difference)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// Write the half-event's field group onto the movement.
fn apply_half_fields(movement: &mut Movement, event: &NormalizedEvent) {
    match event.kind {
        EventKind::Departure => {
            movement.source_warehouse_id = Some(event.warehouse_id.clone());
            movement.departure_timestamp = Some(event.occurred_at);
            movement.departure_quantity = Some(event.quantity);
        }
        EventKind::Arrival => {
            movement.destination_warehouse_id = Some(event.warehouse_id.clone());
            movement.arrival_timestamp = Some(event.occurred_at);
            movement.arrival_quantity = Some(event.quantity);
        }
    }
}

/// Recompute `transfer_time` and `quantity_difference` once both halves are
/// present. An arrival timestamped before its departure is an upstream
/// anomaly: the pair is kept but `transfer_time` stays NULL.
fn recompute_derived(movement: &mut Movement) {
    let (Some(departure), Some(arrival)) =
        (movement.departure_timestamp, movement.arrival_timestamp)
    else {
        return;
    };

    movement.transfer_time = if arrival >= departure {
        Some((arrival - departure).num_milliseconds() as f64 / 1000.0)
    } else {
        None
    };

    movement.quantity_difference =
        match (movement.departure_quantity, movement.arrival_quantity) {
            (Some(departed), Some(arrived)) => Some(arrived - departed),
            _ => None,
        };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn empty_movement(id: &str, product_id: &str) -> Movement {
        Movement {
            id: id.to_string(),
            product_id: product_id.to_string(),
            source_warehouse_id: None,
            departure_timestamp: None,
            departure_quantity: None,
            destination_warehouse_id: None,
            arrival_timestamp: None,
            arrival_quantity: None,
            transfer_time: None,
            quantity_difference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn half(
        kind: EventKind,
        warehouse_id: &str,
        occurred_at: DateTime<Utc>,
        quantity: i64,
    ) -> NormalizedEvent {
        NormalizedEvent {
            message_id: format!("msg-{}-{}", warehouse_id, kind),
            message_source: "test".to_string(),
            message_time: occurred_at,
            movement_id: "mv-1".to_string(),
            warehouse_id: warehouse_id.to_string(),
            product_id: "prod-1".to_string(),
            kind,
            occurred_at,
            quantity,
        }
    }

    fn apply(movement: &mut Movement, event: &NormalizedEvent) {
        apply_half_fields(movement, event);
        recompute_derived(movement);
    }

    #[test]
    fn test_single_half_leaves_derived_fields_null() {
        let t0 = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let mut movement = empty_movement("mv-1", "prod-1");

        apply(&mut movement, &half(EventKind::Arrival, "WH-2", t0, 100));

        assert_eq!(movement.destination_warehouse_id.as_deref(), Some("WH-2"));
        assert_eq!(movement.arrival_quantity, Some(100));
        assert!(movement.source_warehouse_id.is_none());
        assert!(movement.transfer_time.is_none());
        assert!(movement.quantity_difference.is_none());
        assert!(!movement.is_complete());
    }

    #[test]
    fn test_pair_completion_derives_transfer_time_and_difference() {
        let t0 = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(3600);
        let mut movement = empty_movement("mv-1", "prod-1");

        apply(&mut movement, &half(EventKind::Departure, "WH-1", t0, 30));
        apply(&mut movement, &half(EventKind::Arrival, "WH-2", t1, 28));

        assert!(movement.is_complete());
        assert_eq!(movement.transfer_time, Some(3600.0));
        assert_eq!(movement.quantity_difference, Some(-2));
    }

    #[test]
    fn test_halves_commute() {
        let t0 = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(900);
        let departure = half(EventKind::Departure, "WH-1", t0, 50);
        let arrival = half(EventKind::Arrival, "WH-2", t1, 50);

        let mut forward = empty_movement("mv-1", "prod-1");
        apply(&mut forward, &departure);
        apply(&mut forward, &arrival);

        let mut reverse = empty_movement("mv-1", "prod-1");
        apply(&mut reverse, &arrival);
        apply(&mut reverse, &departure);

        assert_eq!(forward.source_warehouse_id, reverse.source_warehouse_id);
        assert_eq!(
            forward.destination_warehouse_id,
            reverse.destination_warehouse_id
        );
        assert_eq!(forward.departure_timestamp, reverse.departure_timestamp);
        assert_eq!(forward.arrival_timestamp, reverse.arrival_timestamp);
        assert_eq!(forward.transfer_time, reverse.transfer_time);
        assert_eq!(forward.transfer_time, Some(900.0));
        assert_eq!(forward.quantity_difference, reverse.quantity_difference);
        assert_eq!(forward.quantity_difference, Some(0));
    }

    #[test]
    fn test_arrival_before_departure_keeps_transfer_time_null() {
        let departure_at = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let arrival_at = departure_at - chrono::Duration::seconds(60);
        let mut movement = empty_movement("mv-1", "prod-1");

        apply(&mut movement, &half(EventKind::Departure, "WH-1", departure_at, 30));
        apply(&mut movement, &half(EventKind::Arrival, "WH-2", arrival_at, 30));

        assert!(movement.is_complete());
        assert!(movement.transfer_time.is_none());
        assert_eq!(movement.quantity_difference, Some(0));
    }

    #[test]
    fn test_repeated_half_is_last_write_wins() {
        let t0 = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(600);
        let t2 = t0 + chrono::Duration::seconds(1200);
        let mut movement = empty_movement("mv-1", "prod-1");

        apply(&mut movement, &half(EventKind::Departure, "WH-1", t0, 30));
        apply(&mut movement, &half(EventKind::Arrival, "WH-2", t2, 28));
        // Second departure overwrites the first without touching the arrival.
        apply(&mut movement, &half(EventKind::Departure, "WH-3", t1, 29));

        assert_eq!(movement.source_warehouse_id.as_deref(), Some("WH-3"));
        assert_eq!(movement.departure_quantity, Some(29));
        assert_eq!(movement.destination_warehouse_id.as_deref(), Some("WH-2"));
        assert_eq!(movement.transfer_time, Some(600.0));
        assert_eq!(movement.quantity_difference, Some(-1));
    }

    #[test]
    fn test_sub_second_transfer_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(1500);
        let mut movement = empty_movement("mv-1", "prod-1");

        apply(&mut movement, &half(EventKind::Departure, "WH-1", t0, 10));
        apply(&mut movement, &half(EventKind::Arrival, "WH-2", t1, 10));

        assert_eq!(movement.transfer_time, Some(1.5));
    }
}
