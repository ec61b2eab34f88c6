//! Outbox relay, inbox consumer and topic settings.

use std::time::Duration;

use serde::Deserialize;

use super::ServiceRole;

/// Outbox relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pause between ticks, in milliseconds. Default: 500.
    pub interval_ms: u64,
    /// Maximum entries claimed per tick. Default: 10.
    pub batch_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            batch_size: 10,
        }
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Inbox consumer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Wait before retrying a delivery whose unit of work failed. Default: 1000.
    pub retry_interval_ms: u64,
    /// Consumer group of the order service.
    pub orders_group: String,
    /// Consumer group of the payment service.
    pub payments_group: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
            orders_group: "orders-group".to_string(),
            payments_group: "payments-group".to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn group_for(&self, role: ServiceRole) -> &str {
        match role {
            ServiceRole::Orders => &self.orders_group,
            ServiceRole::Payments => &self.payments_group,
        }
    }
}

/// Topic names shared by both services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Order service → payment service.
    pub orders_created: String,
    /// Payment service → order service.
    pub payments_processed: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            orders_created: "orders.created".to_string(),
            payments_processed: "payments.processed".to_string(),
        }
    }
}
