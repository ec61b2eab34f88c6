//! Payment service.

use std::sync::Arc;

use axum::Router;
use tracing::info;

use super::{serve_http, BackgroundTasks, BoxError};
use crate::api::{payments_router, PaymentsState};
use crate::bus::{spawn_relay, BusError, MessageBus, OutboxRelay};
use crate::config::{Config, ServiceRole};
use crate::consumer::{spawn_consumer, IdempotentConsumer, PaymentHandler};
use crate::storage::LedgerHandles;
use crate::utils::Shutdown;

/// Funds ledger, `orders.created` consumer and `payments.processed` relay.
pub struct PaymentsService {
    config: Config,
    storage: LedgerHandles,
    bus: Arc<dyn MessageBus>,
}

impl PaymentsService {
    pub fn new(config: Config, storage: LedgerHandles, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            storage,
            bus,
        }
    }

    pub fn router(&self) -> Router {
        payments_router(PaymentsState::new(self.storage.accounts.clone()))
    }

    /// Start the order consumer and the relay.
    pub async fn start_background(&self) -> Result<BackgroundTasks, BusError> {
        let group = self.config.consumer.group_for(ServiceRole::Payments);
        let subscription = self
            .bus
            .subscribe(&self.config.topics.orders_created, group)
            .await?;

        let consumer = spawn_consumer(IdempotentConsumer::new(
            subscription,
            Arc::new(PaymentHandler::new(
                self.storage.accounts.clone(),
                self.config.topics.payments_processed.clone(),
            )),
            &self.config.consumer,
        ));
        let relay = spawn_relay(OutboxRelay::new(
            self.storage.outbox.clone(),
            self.bus.clone(),
            self.config.relay.clone(),
        ));

        info!(
            topic = %self.config.topics.orders_created,
            group = %group,
            "Payment service background tasks started"
        );
        Ok(BackgroundTasks::new(relay, consumer))
    }

    /// Run until `shutdown` fires, serving HTTP on `addr`.
    pub async fn run(self, addr: &str, shutdown: Shutdown) -> Result<(), BoxError> {
        let tasks = self.start_background().await?;
        let result = serve_http(self.router(), addr, shutdown).await;
        tasks.shutdown().await;
        result
    }
}
