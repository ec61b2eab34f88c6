//! Order service handler for `payments.processed`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{HandleOutcome, HandlerError, MessageHandler};
use crate::bus::Delivery;
use crate::domain::{Notification, PaymentOutcome};
use crate::notify::NotificationHub;
use crate::storage::{InboxOutcome, OrderLedger, StatusChange};

/// Applies payment outcomes to orders and notifies the owner.
pub struct OrderOutcomeHandler {
    ledger: Arc<dyn OrderLedger>,
    hub: NotificationHub,
}

impl OrderOutcomeHandler {
    pub fn new(ledger: Arc<dyn OrderLedger>, hub: NotificationHub) -> Self {
        Self { ledger, hub }
    }
}

#[async_trait]
impl MessageHandler for OrderOutcomeHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<HandleOutcome, HandlerError> {
        let outcome: PaymentOutcome = serde_json::from_slice(&delivery.payload)?;

        let applied = self
            .ledger
            .apply_payment_outcome(&delivery.inbox_id(), &outcome)
            .await?;

        match applied {
            InboxOutcome::Applied(StatusChange::Updated { user_id, status }) => {
                info!(order_id = %outcome.order_id, status = %status, "Order status updated");
                // Pushed after commit; a missed push is not retried.
                let pushed = self.hub.push_if_present(
                    user_id,
                    &Notification::OrderUpdated {
                        order_id: outcome.order_id,
                        status,
                    },
                );
                if pushed {
                    info!(user_id = %user_id, order_id = %outcome.order_id, "Notification sent");
                }
                Ok(HandleOutcome::Applied)
            }
            InboxOutcome::Applied(StatusChange::OrderNotFound) => {
                warn!(order_id = %outcome.order_id, "Payment outcome for unknown order");
                Ok(HandleOutcome::Dropped)
            }
            InboxOutcome::Duplicate => {
                info!(order_id = %outcome.order_id, "Duplicate payment message, skipped");
                Ok(HandleOutcome::Duplicate)
            }
        }
    }
}
