//! Domain types shared by both services.
//!
//! - `Order`, `OrderStatus`, `NewOrder`: the order ledger's entity
//! - `Account`: the funds ledger's entity
//! - `OrderCreated`, `PaymentOutcome`, `Notification`: wire payloads

mod account;
mod events;
mod order;

pub use account::Account;
pub use events::{Notification, OrderCreated, PaymentOutcome, PaymentStatus};
pub use order::{NewOrder, Order, OrderStatus};

/// Errors raised when a command fails validation at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("unknown order status: {0}")]
    UnknownStatus(String),

    #[error("deposit of {amount} would overflow the balance of {user_id}")]
    BalanceOverflow { user_id: uuid::Uuid, amount: i64 },
}

/// Reject zero and negative amounts.
pub fn positive_amount(amount: i64) -> Result<i64, ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(amount)
}
