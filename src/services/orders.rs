//! Order service.

use std::sync::Arc;

use axum::Router;
use tracing::info;

use super::{serve_http, BackgroundTasks, BoxError};
use crate::api::{orders_router, OrdersState};
use crate::bus::{spawn_relay, BusError, MessageBus, OutboxRelay};
use crate::config::{Config, ServiceRole};
use crate::consumer::{spawn_consumer, IdempotentConsumer, OrderOutcomeHandler};
use crate::notify::NotificationHub;
use crate::storage::LedgerHandles;
use crate::utils::Shutdown;

/// Order ledger, `orders.created` relay, `payments.processed` consumer and
/// the push channel.
pub struct OrdersService {
    config: Config,
    storage: LedgerHandles,
    bus: Arc<dyn MessageBus>,
    hub: NotificationHub,
}

impl OrdersService {
    pub fn new(config: Config, storage: LedgerHandles, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            storage,
            bus,
            hub: NotificationHub::new(),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn router(&self) -> Router {
        orders_router(OrdersState::new(
            self.storage.orders.clone(),
            self.hub.clone(),
            &self.config.topics.orders_created,
        ))
    }

    /// Start the relay and the payment-outcome consumer.
    pub async fn start_background(&self) -> Result<BackgroundTasks, BusError> {
        let group = self.config.consumer.group_for(ServiceRole::Orders);
        let subscription = self
            .bus
            .subscribe(&self.config.topics.payments_processed, group)
            .await?;

        let consumer = spawn_consumer(IdempotentConsumer::new(
            subscription,
            Arc::new(OrderOutcomeHandler::new(
                self.storage.orders.clone(),
                self.hub.clone(),
            )),
            &self.config.consumer,
        ));
        let relay = spawn_relay(OutboxRelay::new(
            self.storage.outbox.clone(),
            self.bus.clone(),
            self.config.relay.clone(),
        ));

        info!(
            topic = %self.config.topics.payments_processed,
            group = %group,
            "Order service background tasks started"
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
