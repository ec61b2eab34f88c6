//! Mock message bus implementation for testing.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, MessageBus, OutboundMessage, Result, Subscription};

/// Mock message bus for testing.
///
/// Records every successful publish. Failures can be injected for all
/// messages or only for specific keys, and a delay can be added to widen
/// race windows in concurrency tests.
#[derive(Default)]
pub struct MockBus {
    published: RwLock<Vec<OutboundMessage>>,
    fail_on_publish: RwLock<bool>,
    failing_keys: RwLock<HashSet<String>>,
    publish_delay: RwLock<Option<Duration>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    /// Fail publishes whose key is `key` until cleared.
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.write().await.insert(key.into());
    }

    pub async fn clear_failing_keys(&self) {
        self.failing_keys.write().await.clear();
    }

    pub async fn set_publish_delay(&self, delay: Option<Duration>) {
        *self.publish_delay.write().await = delay;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<OutboundMessage> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// How many times each message id was published.
    pub async fn publish_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for message in self.published.read().await.iter() {
            *counts.entry(message.message_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        let delay = *self.publish_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        if self.failing_keys.read().await.contains(&message.key) {
            return Err(BusError::Publish(format!(
                "Mock publish failure for key {}",
                message.key
            )));
        }
        self.published.write().await.push(message.clone());
        Ok(())
    }

    async fn subscribe(&self, _topic: &str, _group: &str) -> Result<Box<dyn Subscription>> {
        Err(BusError::SubscribeNotSupported)
    }
}
