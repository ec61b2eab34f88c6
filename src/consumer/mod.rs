//! Idempotent inbox consumer.
//!
//! Pulls one delivery at a time from a subscription and hands it to a
//! `MessageHandler`. The handler applies the message inside one store
//! transaction that records the message id in the inbox first, so a
//! redelivered message is recognised and committed with no effect.
//!
//! A delivery is acknowledged only after the handler returns `Ok`. Malformed
//! payloads are logged and acknowledged so they cannot block the partition.
//! Store failures leave the delivery unacknowledged and the same delivery is
//! retried after `retry_interval`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn, Instrument};

use crate::bus::{Delivery, Subscription};
use crate::config::ConsumerConfig;
use crate::storage::StorageError;
use crate::utils::{Shutdown, TaskHandle};

pub mod orders;
pub mod payments;

pub use orders::OrderOutcomeHandler;
pub use payments::PaymentHandler;

/// What a handler did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Effect committed together with the inbox row.
    Applied,
    /// Message id was already in the inbox.
    Duplicate,
    /// Recorded but had nothing to act on (e.g. unknown order).
    Dropped,
}

/// Errors a handler can report.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload can never be applied. Acked and skipped.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The unit of work failed. Not acked; retried.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Malformed(e.to_string())
    }
}

/// Applies one delivery to the local ledger.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<HandleOutcome, HandlerError>;
}

/// Subscription loop with inbox-based deduplication.
pub struct IdempotentConsumer {
    subscription: Box<dyn Subscription>,
    handler: Arc<dyn MessageHandler>,
    retry_interval: Duration,
}

impl IdempotentConsumer {
    pub fn new(
        subscription: Box<dyn Subscription>,
        handler: Arc<dyn MessageHandler>,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            subscription,
            handler,
            retry_interval: config.retry_interval(),
        }
    }

    /// Consume until shutdown or until the bus closes.
    ///
    /// Shutdown is observed while waiting for a delivery and while waiting to
    /// retry, never in the middle of a handler call.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!("Consumer started");

        loop {
            let next = tokio::select! {
                next = self.subscription.next() => next,
                _ = shutdown.wait() => break,
            };

            match next {
                Ok(Some(delivery)) => {
                    if !self.process(&delivery, &mut shutdown).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Subscription closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive delivery, retrying");
                    if !pause(self.retry_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Consumer stopped");
    }

    /// Apply one delivery until it succeeds or is dropped. Returns `false` if
    /// shutdown interrupted a retry wait.
    async fn process(&mut self, delivery: &Delivery, shutdown: &mut Shutdown) -> bool {
        let inbox_id = delivery.inbox_id();
        let span = tracing::info_span!(
            "consumer.handle",
            topic = %delivery.topic,
            message_id = %inbox_id,
            offset = delivery.offset
        );

        loop {
            match self.handler.handle(delivery).instrument(span.clone()).await {
                Ok(outcome) => {
                    debug!(message_id = %inbox_id, ?outcome, "Delivery handled");
                    self.ack(delivery).await;
                    return true;
                }
                Err(HandlerError::Malformed(reason)) => {
                    warn!(
                        topic = %delivery.topic,
                        message_id = %inbox_id,
                        reason = %reason,
                        "Dropping malformed message"
                    );
                    self.ack(delivery).await;
                    return true;
                }
                Err(HandlerError::Storage(e)) => {
                    warn!(
                        topic = %delivery.topic,
                        message_id = %inbox_id,
                        error = %e,
                        "Failed to apply message, will retry"
                    );
                    if !pause(self.retry_interval, shutdown).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) {
        // A lost ack means redelivery, which the inbox absorbs.
        if let Err(e) = self.subscription.ack(delivery).await {
            warn!(offset = delivery.offset, error = %e, "Failed to ack delivery");
        }
    }
}

/// Sleep for `interval`. `false` if shutdown fired first.
async fn pause(interval: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = shutdown.wait() => false,
    }
}

/// Spawn the consumer loop on the runtime.
pub fn spawn_consumer(consumer: IdempotentConsumer) -> TaskHandle {
    TaskHandle::spawn("inbox-consumer", move |shutdown| async move {
        consumer.run(shutdown).await;
    })
}

#[cfg(test)]
mod tests;
