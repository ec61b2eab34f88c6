use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A funds account, one per user. `balance` never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: Uuid,
    pub balance: i64,
}

impl Account {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            balance: 0,
        }
    }
}
