//! Message bus for cross-service delivery.
//!
//! This module contains:
//! - `MessageBus` trait: keyed publish + consumer-group subscriptions
//! - `Subscription` trait: pull one delivery at a time, ack after commit
//! - Implementations: in-process channel log, Kafka, Mock
//!
//! Delivery is at-least-once. A delivery that is never acked is handed out
//! again to the next subscription of the same consumer group.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{MessagingConfig, MessagingType};

// Implementation modules
#[cfg(feature = "channel")]
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;
pub mod outbox;

// Re-exports
#[cfg(feature = "channel")]
pub use channel::ChannelBus;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBus, KafkaBusConfig};
pub use mock::MockBus;
pub use outbox::{spawn_relay, OutboxRelay, RelayConfig, RelayTick};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Ack failed: {0}")]
    Ack(String),

    #[error("Bus closed")]
    Closed,

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,
}

/// A message handed to the bus by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Partition key. Messages with the same key keep their relative order.
    pub key: String,
    /// Stable identity of the message; consumers dedupe on it.
    pub message_id: String,
    pub payload: Vec<u8>,
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub key: Option<String>,
    pub message_id: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl Delivery {
    /// Identity recorded in the consumer's inbox.
    ///
    /// Falls back to the transport coordinates when the producer did not
    /// attach a message id. Those are stable across redeliveries of the same
    /// record, though not across topic recreation.
    pub fn inbox_id(&self) -> String {
        match &self.message_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}/{}/{}", self.topic, self.partition, self.offset),
        }
    }
}

/// Interface for keyed message delivery between services.
///
/// Implementations:
/// - `ChannelBus`: in-process topic log (standalone mode)
/// - `KafkaBus`: Apache Kafka via rdkafka
/// - `MockBus`: records publishes for tests
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one message. Returns once the broker has acknowledged it.
    async fn publish(&self, message: &OutboundMessage) -> Result<()>;

    /// Open a subscription on `topic` for consumer group `group`.
    ///
    /// Consumption starts at the group's last acknowledged position.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>>;
}

/// A pull-based stream of deliveries for one consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery. `None` means the bus was closed.
    ///
    /// Until a delivery is acked, calling `next` again on a fresh
    /// subscription of the same group yields it again.
    async fn next(&mut self) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery so the group moves past it.
    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the message bus based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: `--features channel` (included in default)
/// - Kafka: `--features kafka`
pub async fn init_bus(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn MessageBus>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            #[cfg(feature = "channel")]
            {
                info!(messaging_type = "channel", "Message bus initialized");
                Ok(Arc::new(ChannelBus::new()))
            }

            #[cfg(not(feature = "channel"))]
            {
                Err("Channel bus requires the 'channel' feature. Rebuild with --features channel".into())
            }
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let mut kafka_config = KafkaBusConfig::new(&config.kafka.bootstrap_servers);
                if let Some(group) = config.kafka.group_id.as_ref() {
                    kafka_config = kafka_config.with_group_id(group);
                }
                let bus = KafkaBus::new(kafka_config)?;
                info!(
                    messaging_type = "kafka",
                    bootstrap_servers = %config.kafka.bootstrap_servers,
                    "Message bus initialized"
                );
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
