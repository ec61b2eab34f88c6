//! ledgerbridge - order and funds ledgers kept consistent over a message bus
//!
//! Two services exchange events without distributed transactions:
//!
//! - Every announced mutation writes an outbox row in the same transaction
//!   (`storage`), and a relay drains the outbox to the bus (`bus::outbox`).
//! - Every consumed message records its id in an inbox in the same
//!   transaction as its effect (`consumer`), so redelivery is harmless.
//!
//! The order service pushes status changes to connected clients (`notify`).

pub mod api;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod notify;
pub mod services;
pub mod storage;
pub mod utils;
