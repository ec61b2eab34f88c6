use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

/// Lifecycle status of an order.
///
/// `New` is set on creation; the two terminal states are only ever written by
/// the order consumer when a payment outcome arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Finished,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Finished => "FINISHED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::New)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "FINISHED" => Ok(OrderStatus::Finished),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// An order as stored in the order ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Smallest currency unit, always > 0.
    pub amount: i64,
    pub description: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Validated create-order command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
}

impl NewOrder {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            user_id,
            amount: super::positive_amount(amount)?,
            description: description.into(),
        })
    }

    /// Materialize the order row with a fresh id and `NEW` status.
    ///
    /// `created_at` is truncated to microseconds, the precision every ledger
    /// stores.
    pub fn into_order(self) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            status: OrderStatus::New,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_rejects_non_positive_amount() {
        let user = Uuid::new_v4();
        assert_eq!(
            NewOrder::new(user, 0, "zero"),
            Err(ValidationError::NonPositiveAmount(0))
        );
        assert_eq!(
            NewOrder::new(user, -5, "negative"),
            Err(ValidationError::NonPositiveAmount(-5))
        );
        assert!(NewOrder::new(user, 1, "ok").is_ok());
    }

    #[test]
    fn test_into_order_starts_new() {
        let order = NewOrder::new(Uuid::new_v4(), 500, "book")
            .unwrap()
            .into_order();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.amount, 500);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
        assert_eq!("FINISHED".parse::<OrderStatus>(), Ok(OrderStatus::Finished));
        assert!("PAID".parse::<OrderStatus>().is_err());
    }
}
