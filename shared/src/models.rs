// ============================================================================
// STOCKFLOW - DOMAIN MODELS
// ============================================================================
// Module: shared/src/models.rs
// Description: Row types and read views for stocks and movements
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two halves of a movement. Stored in Postgres as the `event_type` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Arrival,
    Departure,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Arrival => f.write_str("arrival"),
            EventKind::Departure => f.write_str("departure"),
        }
    }
}

/// Current quantity of a product at a warehouse. Serves both as the
/// `warehouse_stocks` row and as the cached/API stock view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WarehouseStock {
    pub warehouse_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// A movement row assembled from up to two half-events.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movement {
    pub id: String,
    pub product_id: String,
    pub source_warehouse_id: Option<String>,
    pub departure_timestamp: Option<DateTime<Utc>>,
    pub departure_quantity: Option<i64>,
    pub destination_warehouse_id: Option<String>,
    pub arrival_timestamp: Option<DateTime<Utc>>,
    pub arrival_quantity: Option<i64>,
    pub transfer_time: Option<f64>,
    pub quantity_difference: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movement {
    /// A movement is complete once both half-events have been recorded.
    pub fn is_complete(&self) -> bool {
        self.departure_timestamp.is_some() && self.arrival_timestamp.is_some()
    }
}

/// Movement view served by the read path and stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementDetail {
    pub id: String,
    pub product_id: String,
    pub source_warehouse_id: Option<String>,
    pub destination_warehouse_id: Option<String>,
    pub departure_timestamp: Option<DateTime<Utc>>,
    pub arrival_timestamp: Option<DateTime<Utc>>,
    pub departure_quantity: Option<i64>,
    pub arrival_quantity: Option<i64>,
    pub transfer_time: Option<f64>,
    pub quantity_difference: Option<i64>,
    pub is_complete: bool,
}

impl From<Movement> for MovementDetail {
    fn from(movement: Movement) -> Self {
        let is_complete = movement.is_complete();
        Self {
            id: movement.id,
            product_id: movement.product_id,
            source_warehouse_id: movement.source_warehouse_id,
            destination_warehouse_id: movement.destination_warehouse_id,
            departure_timestamp: movement.departure_timestamp,
            arrival_timestamp: movement.arrival_timestamp,
            departure_quantity: movement.departure_quantity,
            arrival_quantity: movement.arrival_quantity,
            transfer_time: movement.transfer_time,
            quantity_difference: movement.quantity_difference,
            is_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn movement(id: &str) -> Movement {
        Movement {
            id: id.to_string(),
            product_id: "p1".to_string(),
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

    #[test]
    fn test_movement_completeness() {
        let mut m = movement("m1");
        assert!(!m.is_complete());

        m.departure_timestamp = Some(Utc.with_ymd_and_hms(2025, 2, 18, 14, 0, 0).unwrap());
        assert!(!m.is_complete());

        m.arrival_timestamp = Some(Utc.with_ymd_and_hms(2025, 2, 18, 15, 0, 0).unwrap());
        assert!(m.is_complete());
    }

    #[test]
    fn test_movement_detail_carries_completeness() {
        let mut m = movement("m2");
        m.destination_warehouse_id = Some("w2".to_string());
        m.arrival_timestamp = Some(Utc.with_ymd_and_hms(2025, 2, 18, 15, 0, 0).unwrap());
        m.arrival_quantity = Some(28);

        let detail = MovementDetail::from(m);
        assert!(!detail.is_complete);
        assert_eq!(detail.arrival_quantity, Some(28));
        assert_eq!(detail.departure_quantity, None);
    }

    #[test]
    fn test_event_kind_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&EventKind::Arrival).unwrap(),
            "\"arrival\""
        );
        assert_eq!(
            serde_json::from_str::<EventKind>("\"departure\"").unwrap(),
            EventKind::Departure
        );
    }
}
