//! In-process message bus for standalone mode.
//!
//! Keeps an append-only log per topic and a committed offset per consumer
//! group, so it behaves like a single-partition broker: a delivery that was
//! never acked is handed out again to the next subscription of that group.
//! Ideal for local development and testing without external dependencies.
//!
//! Records every subscribed group has acked are dropped from the front of the
//! log. Offsets keep counting from where they were. A group that subscribes
//! for the first time starts at the oldest retained record, so it never sees
//! what was dropped before it joined.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{BusError, Delivery, MessageBus, OutboundMessage, Result, Subscription};

/// Single partition; offsets are positions in the topic log.
const PARTITION: i32 = 0;

#[derive(Debug, Clone)]
struct Record {
    key: String,
    message_id: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct TopicLog {
    /// Offset of `records[0]`.
    base: i64,
    records: VecDeque<Record>,
    /// Next offset to deliver, per consumer group.
    committed: HashMap<String, i64>,
}

impl TopicLog {
    fn end(&self) -> i64 {
        self.base + self.records.len() as i64
    }

    fn get(&self, offset: i64) -> Option<&Record> {
        let index = offset.checked_sub(self.base)?;
        self.records.get(usize::try_from(index).ok()?)
    }

    /// Drop the records below the lowest committed offset of any group.
    fn compact(&mut self) -> usize {
        let Some(low) = self.committed.values().copied().min() else {
            return 0;
        };
        let mut dropped = 0;
        while self.base < low && self.records.pop_front().is_some() {
            self.base += 1;
            dropped += 1;
        }
        dropped
    }
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, TopicLog>>,
    appended: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory message bus backed by per-topic logs.
///
/// Clones share the same logs.
#[derive(Clone, Default)]
pub struct ChannelBus {
    shared: Arc<Shared>,
}

impl ChannelBus {
    pub fn new() -> Self {
        info!("Channel message bus initialized");
        Self::default()
    }

    /// Wake every subscription and make further `next` calls return `None`.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.appended.notify_waiters();
    }

    /// Number of records ever published to `topic`.
    pub fn published_count(&self, topic: &str) -> usize {
        self.shared
            .topics()
            .get(topic)
            .map(|log| log.end() as usize)
            .unwrap_or(0)
    }

    /// Number of records of `topic` still held in memory.
    pub fn retained_count(&self, topic: &str) -> usize {
        self.shared
            .topics()
            .get(topic)
            .map(|log| log.records.len())
            .unwrap_or(0)
    }

    /// Committed offset of `group` on `topic`.
    pub fn committed_offset(&self, topic: &str, group: &str) -> i64 {
        self.shared
            .topics()
            .get(topic)
            .and_then(|log| log.committed.get(group).copied())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(topic = %message.topic, key = %message.key))]
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let offset = {
            let mut topics = self.shared.topics();
            let log = topics.entry(message.topic.clone()).or_default();
            log.records.push_back(Record {
                key: message.key.clone(),
                message_id: message.message_id.clone(),
                payload: message.payload.clone(),
            });
            log.end() - 1
        };
        self.shared.appended.notify_waiters();

        debug!(
            message_id = %message.message_id,
            offset = offset,
            "Published message to channel"
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        let position = {
            let mut topics = self.shared.topics();
            let log = topics.entry(topic.to_string()).or_default();
            let base = log.base;
            *log.committed.entry(group.to_string()).or_insert(base)
        };

        info!(topic = %topic, group = %group, position = position, "Channel subscription opened");

        Ok(Box::new(ChannelSubscription {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position,
        }))
    }
}

/// Cursor over one topic log for one consumer group.
pub struct ChannelSubscription {
    shared: Arc<Shared>,
    topic: String,
    group: String,
    position: i64,
}

impl ChannelSubscription {
    fn try_next(&mut self) -> Option<Delivery> {
        let topics = self.shared.topics();
        let log = topics.get(&self.topic)?;
        // Another subscription of this group acked past us and the log moved on.
        self.position = self.position.max(log.base);
        let record = log.get(self.position)?;

        let delivery = Delivery {
            topic: self.topic.clone(),
            key: Some(record.key.clone()),
            message_id: Some(record.message_id.clone()),
            payload: record.payload.clone(),
            partition: PARTITION,
            offset: self.position,
        };
        self.position += 1;
        Some(delivery)
    }
}

#[async_trait]
impl Subscription for ChannelSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        let shared = self.shared.clone();
        loop {
            let appended = shared.appended.notified();
            tokio::pin!(appended);
            // Register before checking so a publish in between is not missed.
            appended.as_mut().enable();

            if shared.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if let Some(delivery) = self.try_next() {
                return Ok(Some(delivery));
            }

            appended.await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let mut topics = self.shared.topics();
        let log = topics
            .get_mut(&delivery.topic)
            .ok_or_else(|| BusError::Ack(format!("unknown topic {}", delivery.topic)))?;
        let committed = log.committed.entry(self.group.clone()).or_insert(0);
        *committed = (*committed).max(delivery.offset + 1);

        let dropped = log.compact();
        if dropped > 0 {
            debug!(topic = %delivery.topic, dropped = dropped, base = log.base, "Compacted channel topic log");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
