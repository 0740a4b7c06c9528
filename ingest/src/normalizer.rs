// ============================================================================
// STOCKFLOW - EVENT NORMALIZER
// ============================================================================
// Module: ingest/src/normalizer.rs
// Description: Decodes raw Kafka payloads into validated, typed events
// ============================================================================

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_shared::models::EventKind;

/// Message envelope as produced upstream. `time` is milliseconds since epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub source: String,
    pub specversion: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub datacontenttype: String,
    pub dataschema: String,
    pub time: i64,
    pub subject: String,
    pub destination: String,
    pub data: MovementPayload,
}

/// The `data` block of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementPayload {
    pub movement_id: String,
    pub warehouse_id: String,
    pub timestamp: String,
    pub event: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Rejection reasons. Every variant is terminal: the message is logged and
/// skipped, because redelivering a malformed payload would wedge the
/// partition forever. A production deployment would route these to a DLQ.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload failed envelope validation: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("envelope time must be non-negative epoch milliseconds, got {0}")]
    InvalidTime(i64),

    #[error("invalid event timestamp {0:?}, expected ISO-8601")]
    InvalidTimestamp(String),

    #[error("invalid event kind {0:?}, expected \"arrival\" or \"departure\"")]
    InvalidEventKind(String),
}

/// A validated movement event, ready for the transaction coordinator.
///
/// `quantity` is carried through unchanged; the sign applied to the stock
/// ledger is decided by the coordinator based on `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub message_id: String,
    pub message_source: String,
    pub message_time: DateTime<Utc>,
    pub movement_id: String,
    pub warehouse_id: String,
    pub product_id: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub quantity: i64,
}

impl NormalizedEvent {
    /// Stock delta for this event: arrivals add, departures withdraw.
    pub fn signed_quantity(&self) -> i64 {
        match self.kind {
            EventKind::Arrival => self.quantity,
            EventKind::Departure => -self.quantity,
        }
    }
}

/// Decode and validate one raw message payload.
pub fn normalize(payload: &[u8]) -> Result<NormalizedEvent, NormalizeError> {
    let envelope: MessageEnvelope = serde_json::from_slice(payload)?;

    if envelope.time < 0 {
        return Err(NormalizeError::InvalidTime(envelope.time));
    }
    let message_time = Utc
        .timestamp_millis_opt(envelope.time)
        .single()
        .ok_or(NormalizeError::InvalidTime(envelope.time))?;

    let occurred_at = parse_event_timestamp(&envelope.data.timestamp)?;
    let kind = parse_event_kind(&envelope.data.event)?;

    Ok(NormalizedEvent {
        message_id: envelope.id,
        message_source: envelope.source,
        message_time,
        movement_id: envelope.data.movement_id,
        warehouse_id: envelope.data.warehouse_id,
        product_id: envelope.data.product_id,
        kind,
        occurred_at,
        quantity: envelope.data.quantity,
    })
}

/// Parse the event timestamp. A trailing `Z` is equivalent to `+00:00`; a
/// timestamp without any timezone is interpreted as UTC.
fn parse_event_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    raw.parse::<NaiveDateTime>()
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| NormalizeError::InvalidTimestamp(raw.to_string()))
}

/// Normalize the event kind, accepting any casing of the two known values.
fn parse_event_kind(raw: &str) -> Result<EventKind, NormalizeError> {
    match raw.to_ascii_lowercase().as_str() {
        "arrival" => Ok(EventKind::Arrival),
        "departure" => Ok(EventKind::Departure),
        _ => Err(NormalizeError::InvalidEventKind(raw.to_string())),
    }
}
