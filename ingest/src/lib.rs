//! Event-processing core: consumes warehouse movement events from Kafka and
//! applies each one as a single database transaction over the stock ledger,
//! the movement pairing store and the processed-event journal, invalidating
//! the read-path cache after commit.

pub mod consumer;
pub mod normalizer;
pub mod processor;
pub mod repo;

pub use consumer::MovementConsumer;
pub use normalizer::{normalize, NormalizeError, NormalizedEvent};
pub use processor::{process_event, Outcome, ProcessError};
