// ============================================================================
// STOCKFLOW - KAFKA CONSUMER LOOP
// ============================================================================
// Module: ingest/src/consumer.rs
// Description: Pulls movement events from Kafka and drives the coordinator,
//              committing offsets only past fully processed messages
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::{Offset, TopicPartitionList};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use stockflow_shared::config::KafkaConfig;
use stockflow_shared::CacheManager;

use crate::normalizer::normalize;
use crate::processor::{process_event, Outcome};

/// How long one poll waits for messages before giving control back to the
/// loop; keeps the consumer responsive to the stop signal.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Backoff after a failed consumer start.
const STARTUP_RETRY: Duration = Duration::from_secs(10);

/// Backoff after a broker error mid-consumption.
const BROKER_RETRY: Duration = Duration::from_secs(5);

/// What to do with the partition after one message has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Effects are committed (or the rejection is terminal): the offset may
    /// move past this message.
    Advance,
    /// The message must be redelivered: stop processing this partition and
    /// leave the offset where it is.
    Retry,
}

/// librdkafka properties derived from the service configuration. Offsets are
/// committed manually, only after the message's transaction has committed.
fn consumer_properties(config: &KafkaConfig) -> Vec<(&'static str, String)> {
    vec![
        ("bootstrap.servers", config.brokers.clone()),
        ("group.id", config.group_id.clone()),
        ("auto.offset.reset", "earliest".to_string()),
        ("enable.auto.commit", "false".to_string()),
        (
            "max.poll.interval.ms",
            config.max_poll_interval_ms.to_string(),
        ),
        ("session.timeout.ms", config.session_timeout_ms.to_string()),
        (
            "heartbeat.interval.ms",
            config.heartbeat_interval_ms.to_string(),
        ),
        ("fetch.wait.max.ms", config.fetch_max_wait_ms.to_string()),
    ]
}

/// Durable consumer task: owns the Kafka client and the per-partition offset
/// cursors for its assigned partitions. Peers in the same consumer group
/// split partitions between them; ordering holds within a partition only,
/// which is safe because the pairing store is order-insensitive.
pub struct MovementConsumer {
    kafka: KafkaConfig,
    pool: PgPool,
    cache: CacheManager,
    shutdown: watch::Receiver<bool>,
}

impl MovementConsumer {
    pub fn new(
        kafka: KafkaConfig,
        pool: PgPool,
        cache: CacheManager,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            kafka,
            pool,
            cache,
            shutdown,
        }
    }

    /// Run until the stop signal flips. Consumer creation failures are
    /// retried indefinitely with a fixed backoff; an in-flight message is
    /// always driven to commit or rollback before the task returns.
    pub async fn run(mut self) {
        info!(
            brokers = %self.kafka.brokers,
            topic = %self.kafka.topic,
            group_id = %self.kafka.group_id,
            "Initializing Kafka consumer"
        );

        while !self.stopping() {
            let consumer = match self.create_consumer() {
                Ok(consumer) => consumer,
                Err(e) => {
                    error!(error = %e, "Failed to start Kafka consumer, retrying in 10 seconds");
                    self.sleep_or_stop(STARTUP_RETRY).await;
                    continue;
                }
            };

            info!(topic = %self.kafka.topic, "Kafka consumer started successfully");
            self.consume(&consumer).await;
            break;
        }

        info!("Kafka consumer stopped");
    }

    fn create_consumer(&self) -> KafkaResult<StreamConsumer> {
        let mut client_config = ClientConfig::new();
        for (key, value) in consumer_properties(&self.kafka) {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[self.kafka.topic.as_str()])?;
        Ok(consumer)
    }

    /// Main poll loop: fetch a batch, process it partition by partition in
    /// offset order, then commit the furthest fully-processed offsets.
    async fn consume(&mut self, consumer: &StreamConsumer) {
        loop {
            if self.stopping() {
                info!("Stop signal observed, shutting down Kafka consumer");
                return;
            }

            let batch = match self.poll_batch(consumer).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Kafka error during message consumption, backing off");
                    self.sleep_or_stop(BROKER_RETRY).await;
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            let mut commits = TopicPartitionList::new();
            for (partition, messages) in &batch {
                debug!(
                    partition,
                    count = messages.len(),
                    "Processing partition batch"
                );

                if let Some(last_successful) =
                    self.process_partition(consumer, *partition, messages).await
                {
                    let next_offset = last_successful + 1;
                    if let Err(e) = commits.add_partition_offset(
                        &self.kafka.topic,
                        *partition,
                        Offset::Offset(next_offset),
                    ) {
                        error!(partition, error = %e, "Failed to stage offset for commit");
                    }
                }
            }

            if commits.count() > 0 {
                if let Err(e) = consumer.commit(&commits, CommitMode::Sync) {
                    error!(error = %e, "Failed to commit offsets");
                }
            }
        }
    }

    /// Collect up to `max_poll_records` messages within the poll window,
    /// grouped by partition. Within each group messages keep their fetch
    /// order, which is offset order.
    async fn poll_batch(
        &self,
        consumer: &StreamConsumer,
    ) -> KafkaResult<BTreeMap<i32, Vec<OwnedMessage>>> {
        let mut batch: BTreeMap<i32, Vec<OwnedMessage>> = BTreeMap::new();
        let mut total = 0;
        let deadline = Instant::now() + POLL_TIMEOUT;

        while total < self.kafka.max_poll_records {
            match timeout_at(deadline, consumer.recv()).await {
                Ok(Ok(message)) => {
                    let owned = message.detach();
                    batch.entry(owned.partition()).or_default().push(owned);
                    total += 1;
                }
                Ok(Err(e)) => {
                    if batch.is_empty() {
                        return Err(e);
                    }
                    // Keep what we already fetched; the error will resurface
                    // on the next poll if it persists.
                    warn!(error = %e, "Broker error mid-poll, processing partial batch");
                    break;
                }
                Err(_elapsed) => break,
            }
        }

        Ok(batch)
    }

    /// Process one partition's slice of the batch in offset order and return
    /// the offset of the last successfully handled message, if any. On a
    /// retryable failure the partition is rewound to the failed offset so the
    /// next poll fetches it again.
    async fn process_partition(
        &self,
        consumer: &StreamConsumer,
        partition: i32,
        messages: &[OwnedMessage],
    ) -> Option<i64> {
        let mut last_successful = None;

        for message in messages {
            let offset = message.offset();
            match self.process_message(partition, message).await {
                Disposition::Advance => last_successful = Some(offset),
                Disposition::Retry => {
                    warn!(
                        topic = %self.kafka.topic,
                        partition,
                        offset,
                        "Processing failed, offset will not be committed for this partition batch"
                    );
                    if let Err(e) = consumer.seek(
                        &self.kafka.topic,
                        partition,
                        Offset::Offset(offset),
                        Duration::from_secs(5),
                    ) {
                        error!(partition, offset, error = %e, "Failed to rewind partition");
                    }
                    break;
                }
            }
        }

        last_successful
    }

    /// Handle a single message: normalize, then hand it to the transaction
    /// coordinator, and classify the result into an offset decision.
    async fn process_message(&self, partition: i32, message: &OwnedMessage) -> Disposition {
        let offset = message.offset();
        let payload = message.payload().unwrap_or_default();

        let event = match normalize(payload) {
            Ok(event) => event,
            Err(e) => {
                // Terminal: redelivering a malformed payload would wedge the
                // partition. A DLQ producer would hook in here.
                error!(
                    partition,
                    offset,
                    error = %e,
                    "Discarding malformed message"
                );
                return Disposition::Advance;
            }
        };

        match process_event(&self.pool, &self.cache, &event).await {
            Ok(Outcome::Applied) => {
                debug!(partition, offset, message_id = %event.message_id, "Message processed");
                Disposition::Advance
            }
            Ok(Outcome::AlreadyProcessed) => {
                info!(
                    partition,
                    offset,
                    message_id = %event.message_id,
                    "Duplicate delivery, advancing without effects"
                );
                Disposition::Advance
            }
            Err(e) if e.is_transient() => {
                error!(
                    partition,
                    offset,
                    message_id = %event.message_id,
                    error = %e,
                    "Transient failure, message will be retried"
                );
                Disposition::Retry
            }
            Err(e) => {
                error!(
                    partition,
                    offset,
                    message_id = %event.message_id,
                    error = %e,
                    "Fatal event, partition stalls until resolved"
                );
                Disposition::Retry
            }
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for the backoff period, waking early if the stop signal flips.
    async fn sleep_or_stop(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_shared::config::AppConfig;

    #[test]
    fn test_consumer_properties_disable_auto_commit() {
        let props = consumer_properties(&AppConfig::default().kafka);
        let lookup = |key: &str| {
            props
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(lookup("enable.auto.commit"), Some("false"));
        assert_eq!(lookup("auto.offset.reset"), Some("earliest"));
        assert_eq!(lookup("group.id"), Some("warehouse_service_group"));
        assert_eq!(lookup("session.timeout.ms"), Some("30000"));
        assert_eq!(lookup("heartbeat.interval.ms"), Some("10000"));
        assert_eq!(lookup("fetch.wait.max.ms"), Some("500"));
        assert_eq!(lookup("max.poll.interval.ms"), Some("300000"));
    }
}
