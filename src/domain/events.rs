use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderStatus;

/// Published by the order service on `orders.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
}

/// Result of attempting to debit an account for an order.
///
/// Insufficient funds and unknown accounts are both `Cancelled`; neither is an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Finished,
    Cancelled,
}

impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Finished => OrderStatus::Finished,
            PaymentStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}

/// Published by the payment service on `payments.processed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub order_id: Uuid,
    pub status: PaymentStatus,
}

/// Messages pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    OrderUpdated { order_id: Uuid, status: OrderStatus },
}

impl Notification {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
