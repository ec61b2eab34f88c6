//! ledgerbridge-standalone: both services in one process
//!
//! Runs the order service and the payment service side by side over one
//! in-process channel bus. Each service keeps its own ledger (one SQLite file
//! per service, or in-memory), so the two still only meet through the bus.
//!
//! ## Ports
//! - Orders: `server.orders_port` (default 8080)
//! - Payments: `server.payments_port` (default 8081)

use tracing::{error, info};

use ledgerbridge::bus::init_bus;
use ledgerbridge::config::{Config, ServiceRole, StorageType};
use ledgerbridge::services::{OrdersService, PaymentsService};
use ledgerbridge::storage::init_storage;
use ledgerbridge::utils::bootstrap::{init_tracing, parse_config_path, wait_for_signal};
use ledgerbridge::utils::ShutdownTrigger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Both services would share one outbox table in a single database.
    if config.storage.storage_type == StorageType::Postgres {
        error!("Standalone mode supports sqlite or memory storage only");
        return Err("standalone mode does not support postgres storage".into());
    }

    info!("Starting ledgerbridge-standalone");

    let orders_storage = init_storage(&config.storage, ServiceRole::Orders).await?;
    let payments_storage = init_storage(&config.storage, ServiceRole::Payments).await?;
    let bus = init_bus(&config.messaging).await?;

    let (trigger, shutdown) = ShutdownTrigger::new();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let orders_addr = config
        .server
        .bind_addr(config.server.role_port(ServiceRole::Orders));
    let payments_addr = config
        .server
        .bind_addr(config.server.role_port(ServiceRole::Payments));

    let orders = OrdersService::new(config.clone(), orders_storage, bus.clone());
    let payments = PaymentsService::new(config, payments_storage, bus);

    tokio::try_join!(
        orders.run(&orders_addr, shutdown.clone()),
        payments.run(&payments_addr, shutdown),
    )?;

    info!("ledgerbridge-standalone stopped");
    Ok(())
}
