//! Payment service handler for `orders.created`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{HandleOutcome, HandlerError, MessageHandler};
use crate::bus::Delivery;
use crate::domain::OrderCreated;
use crate::storage::{AccountLedger, InboxOutcome};

/// Debits the ordering user's account and enqueues the payment outcome.
pub struct PaymentHandler {
    ledger: Arc<dyn AccountLedger>,
    reply_topic: String,
}

impl PaymentHandler {
    pub fn new(ledger: Arc<dyn AccountLedger>, reply_topic: impl Into<String>) -> Self {
        Self {
            ledger,
            reply_topic: reply_topic.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for PaymentHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<HandleOutcome, HandlerError> {
        let event: OrderCreated = serde_json::from_slice(&delivery.payload)?;

        let outcome = self
            .ledger
            .apply_order_created(&delivery.inbox_id(), &event, &self.reply_topic)
            .await?;

        match outcome {
            InboxOutcome::Applied(status) => {
                info!(
                    order_id = %event.order_id,
                    user_id = %event.user_id,
                    amount = event.amount,
                    status = ?status,
                    "Payment processed"
                );
                Ok(HandleOutcome::Applied)
            }
            InboxOutcome::Duplicate => {
                info!(order_id = %event.order_id, "Duplicate order message, skipped");
                Ok(HandleOutcome::Duplicate)
            }
        }
    }
}
