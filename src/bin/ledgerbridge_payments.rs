//! ledgerbridge-payments: payment service
//!
//! Manages accounts over HTTP, consumes `orders.created` through the inbox,
//! debits the ordering user's account with a conditional update and relays
//! the `payments.processed` outcome from its outbox.
//!
//! ## Configuration
//! - `config.yaml`, `--config <path>` or `LEDGERBRIDGE_CONFIG`
//! - `LEDGERBRIDGE__<SECTION>__<KEY>` environment overrides
//! - `DATABASE_URL`, `KAFKA_BROKERS`, `HTTP_PORT`

use tracing::{error, info};

use ledgerbridge::bus::init_bus;
use ledgerbridge::config::{Config, ServiceRole};
use ledgerbridge::services::PaymentsService;
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

    info!("Starting ledgerbridge-payments");

    let storage = init_storage(&config.storage, ServiceRole::Payments).await?;
    let bus = init_bus(&config.messaging).await?;

    let (trigger, shutdown) = ShutdownTrigger::new();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let addr = config
        .server
        .bind_addr(config.server.port_for(ServiceRole::Payments));
    PaymentsService::new(config, storage, bus)
        .run(&addr, shutdown)
        .await?;

    info!("ledgerbridge-payments stopped");
    Ok(())
}
