//! Transactional outbox relay.
//!
//! Ledger mutations append an `OutboxEntry` in the same transaction as the
//! business change. The relay drains those entries to the message bus:
//!
//! 1. Claim up to `batch_size` unpublished entries, oldest first, skipping
//!    rows another relay holds
//! 2. Publish each one and wait for the broker acknowledgement
//! 3. Mark it published inside the same claim, commit at the end of the batch
//!
//! If the process dies between 2 and 3 the entry stays pending and is
//! published again on a later tick. Delivery is at-least-once; consumers
//! dedupe on the message id.
//!
//! # Failed batches
//!
//! On PostgreSQL and in memory the marks of a tick share the claim, so a store
//! error on any mark or on commit undoes every mark of that tick. All entries
//! the tick already published go out again on the next tick, up to
//! `batch_size` duplicates per failure. SQLite applies each mark on its own
//! and only re-publishes the entry whose mark failed.
//!
//! # Ordering
//!
//! Entries are claimed in `created_at, seq` order. When a publish fails, later
//! entries with the same key are held back for the rest of the tick so one key
//! is never delivered out of order by a single relay.
//!
//! # Configuration
//!
//! ```yaml
//! relay:
//!   interval_ms: 500
//!   batch_size: 10
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{MessageBus, OutboundMessage};
use crate::storage::{helpers, OutboxStore, StorageError};
use crate::utils::{Shutdown, TaskHandle};

pub use crate::config::RelayConfig;

// ============================================================================
// Entries
// ============================================================================

/// A persisted outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Store-assigned, strictly increasing. Tie-breaker for `created_at`.
    pub seq: i64,
    /// Message identity handed to the broker.
    pub id: Uuid,
    pub topic: String,
    /// Business id; the broker partition key.
    pub message_key: String,
    /// Serialized JSON event.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub published: bool,
}

impl OutboxEntry {
    pub fn to_message(&self) -> OutboundMessage {
        OutboundMessage {
            topic: self.topic.clone(),
            key: self.message_key.clone(),
            message_id: self.id.to_string(),
            payload: self.payload.clone().into_bytes(),
        }
    }
}

/// An outbox row about to be written alongside a business mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxEntry {
    pub id: Uuid,
    pub topic: String,
    pub message_key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl NewOutboxEntry {
    /// Serialize `event` into a fresh entry for `topic`, keyed by `key`.
    pub fn for_event<T: Serialize>(
        topic: &str,
        key: impl ToString,
        event: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            message_key: key.to_string(),
            payload: serde_json::to_string(event)?,
            created_at: helpers::now(),
        })
    }

    /// The row as stored, once the store assigned `seq`.
    pub fn into_entry(self, seq: i64) -> OutboxEntry {
        OutboxEntry {
            seq,
            id: self.id,
            topic: self.topic,
            message_key: self.message_key,
            payload: self.payload,
            created_at: self.created_at,
            published: false,
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Counters for one relay tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayTick {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    /// Held back because an earlier entry with the same key failed.
    pub deferred: usize,
}

/// Drains one service's outbox to the bus.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn MessageBus>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn OutboxStore>, bus: Arc<dyn MessageBus>, config: RelayConfig) -> Self {
        Self { store, bus, config }
    }

    /// Run a single tick.
    ///
    /// Bus failures are counted, not returned; the entry stays pending.
    /// Store failures abort the tick and roll back its marks.
    pub async fn run_once(&self) -> Result<RelayTick, StorageError> {
        let mut claim = self.store.claim_pending(self.config.batch_size).await?;
        let entries = claim.entries().to_vec();

        let mut tick = RelayTick {
            claimed: entries.len(),
            ..Default::default()
        };
        let mut failed_keys: HashSet<String> = HashSet::new();

        for entry in &entries {
            if failed_keys.contains(&entry.message_key) {
                tick.deferred += 1;
                continue;
            }

            match self.bus.publish(&entry.to_message()).await {
                Ok(()) => {
                    claim.mark_published(entry.id).await?;
                    tick.published += 1;
                    debug!(id = %entry.id, topic = %entry.topic, key = %entry.message_key, "Relayed outbox entry");
                }
                Err(e) => {
                    warn!(
                        id = %entry.id,
                        topic = %entry.topic,
                        key = %entry.message_key,
                        error = %e,
                        "Failed to publish outbox entry, will retry next tick"
                    );
                    failed_keys.insert(entry.message_key.clone());
                    tick.failed += 1;
                }
            }
        }

        claim.commit().await?;
        Ok(tick)
    }

    /// Tick every `interval` until shutdown.
    ///
    /// Shutdown is observed between ticks; a tick in progress completes.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.interval_ms,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => break,
            }

            match self.run_once().await {
                Ok(tick) if tick.published > 0 || tick.failed > 0 => {
                    debug!(
                        published = tick.published,
                        failed = tick.failed,
                        deferred = tick.deferred,
                        "Outbox relay tick"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Outbox relay tick failed"),
            }
        }

        info!("Outbox relay stopped");
    }
}

/// Spawn the relay loop on the runtime.
pub fn spawn_relay(relay: OutboxRelay) -> TaskHandle {
    TaskHandle::spawn("outbox-relay", move |shutdown| async move {
        relay.run(shutdown).await;
    })
}
