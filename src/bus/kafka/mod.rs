//! Kafka message bus implementation.
//!
//! Topics are used as given; no prefixing.
//! Message key: the business id carried by the outbox entry (ordering per key)
//! Header `message-id`: the outbox entry id (consumer dedupe key)
//!
//! Each subscription owns its own `StreamConsumer` with auto-commit disabled;
//! offsets are committed only when the consumer acks a delivery.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message as KafkaMessage, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{BusError, Delivery, MessageBus, OutboundMessage, Result, Subscription};

/// Header carrying the producer-assigned message identity.
pub const MESSAGE_ID_HEADER: &str = "message-id";

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaBusConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Overrides the consumer group requested by `subscribe`.
    pub group_id: Option<String>,
    /// How long a publish may sit in the producer queue before failing.
    pub publish_timeout: Duration,
}

impl KafkaBusConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: None,
            publish_timeout: Duration::from_secs(5),
        }
    }

    /// Pin every subscription to one consumer group.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Consumer group actually used for a subscription request.
    pub fn resolve_group<'a>(&'a self, requested: &'a str) -> &'a str {
        self.group_id.as_deref().unwrap_or(requested)
    }

    /// Durable, idempotent producer: a send completes once every in-sync
    /// replica has the record.
    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("message.timeout.ms", self.publish_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true");
        config
    }

    /// Offsets move only on explicit ack. A new group reads from the start.
    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

/// Kafka message bus.
///
/// Publishing waits for the full ISR acknowledgement (`acks=all`) with the
/// idempotent producer enabled, so a success means the record is durable.
pub struct KafkaBus {
    producer: FutureProducer,
    config: KafkaBusConfig,
}

impl KafkaBus {
    /// Create a new Kafka bus. Connections are established lazily.
    pub fn new(config: KafkaBusConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }

    fn headers_for(message: &OutboundMessage) -> OwnedHeaders {
        OwnedHeaders::new().insert(Header {
            key: MESSAGE_ID_HEADER,
            value: Some(message.message_id.as_str()),
        })
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(topic = %message.topic, key = %message.key))]
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(Self::headers_for(message));

        let (partition, offset) = self
            .producer
            .send(record, self.config.publish_timeout)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(
            message_id = %message.message_id,
            partition = partition,
            offset = offset,
            "Published message to Kafka"
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        let group = self.config.resolve_group(group);
        let consumer: StreamConsumer = self
            .config
            .consumer_config(group)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic = %topic, group = %group, "Subscribed to Kafka topic");

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

/// One consumer-group member reading a single topic.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
}

/// Pull the message id out of the record headers, if present.
fn message_id_from<H: Headers>(headers: Option<&H>) -> Option<String> {
    let headers = headers?;
    headers
        .iter()
        .find(|h| h.key == MESSAGE_ID_HEADER)
        .and_then(|h| h.value)
        .map(|v| String::from_utf8_lossy(v).into_owned())
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Subscribe(format!("Kafka consumer error: {}", e)))?;

        let delivery = Delivery {
            topic: message.topic().to_string(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            message_id: message_id_from(message.headers()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
        };

        debug!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "Received message"
        );
        Ok(Some(delivery))
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &delivery.topic,
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )
        .map_err(|e| BusError::Ack(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| BusError::Ack(format!("Failed to commit offset: {}", e)))
    }
}
