//! Ledger storage.
//!
//! Every mutation that must be announced to the other service writes its
//! outbox row in the same transaction. Every message-driven mutation records
//! its inbox row first, in that same transaction, with a conditional insert;
//! a conflict means the message was already applied and nothing else runs.
//!
//! Implementations:
//! - `SqlLedger<Postgres>`: `FOR UPDATE SKIP LOCKED` claiming
//! - `SqlLedger<Sqlite>`: one writer at a time
//! - `InMemoryLedger`: emulated row locks, for standalone demos and tests

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::bus::outbox::OutboxEntry;
use crate::config::{ServiceRole, StorageConfig, StorageType};
use crate::domain::{
    Account, NewOrder, Order, OrderCreated, OrderStatus, PaymentOutcome, PaymentStatus,
    ValidationError,
};

pub mod helpers;
pub mod memory;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod schema;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod sql;

pub use memory::InMemoryLedger;
#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresLedger;
#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteLedger;

// ============================================================================
// Errors
// ============================================================================

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Account already exists: {0}")]
    DuplicateAccount(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of applying a message through the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxOutcome<T> {
    /// First delivery: the effect and its inbox row were committed together.
    Applied(T),
    /// The message id was already in the inbox; nothing changed.
    Duplicate,
}

impl<T> InboxOutcome<T> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, InboxOutcome::Duplicate)
    }
}

/// What a payment outcome did to the order ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Updated { user_id: Uuid, status: OrderStatus },
    /// No order with that id. Recorded in the inbox and acked.
    OrderNotFound,
}

// ============================================================================
// Traits
// ============================================================================

/// Claimed batch of unpublished outbox entries.
///
/// Holds the row locks until `commit` or drop. Dropping without commit
/// releases the rows unmarked, so they are published again later.
#[async_trait]
pub trait OutboxClaim: Send {
    /// Entries in `created_at, seq` order.
    fn entries(&self) -> &[OutboxEntry];

    /// Mark one claimed entry published. Takes effect on `commit`.
    async fn mark_published(&mut self, id: Uuid) -> Result<()>;

    /// Persist the marks and release the claim.
    async fn commit(&mut self) -> Result<()>;
}

/// Source of unpublished outbox entries for the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `limit` unpublished entries, skipping rows claimed by a
    /// concurrent relay.
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxClaim>>;

    /// All outbox entries in relay order. For diagnostics and tests.
    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>>;
}

/// Read access to the inbox.
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn is_processed(&self, message_id: &str) -> Result<bool>;

    async fn inbox_len(&self) -> Result<usize>;
}

/// Order ledger operations.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Insert the order and its `OrderCreated` outbox entry atomically.
    /// Returns only after commit.
    async fn create_order(&self, order: NewOrder, topic: &str) -> Result<Order>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Orders of one user, newest first.
    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>>;

    /// Apply a payment outcome guarded by the inbox.
    async fn apply_payment_outcome(
        &self,
        message_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<InboxOutcome<StatusChange>>;
}

/// Funds ledger operations.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Create an account with zero balance.
    async fn create_account(&self, user_id: Uuid) -> Result<Account>;

    /// Credit a positive amount. Returns the new state.
    ///
    /// A credit that would overflow the balance is rejected with
    /// `ValidationError::BalanceOverflow` and changes nothing.
    async fn deposit(&self, user_id: Uuid, amount: i64) -> Result<Account>;

    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>>;

    /// Debit for an order guarded by the inbox, and enqueue the reply.
    ///
    /// The debit is one conditional update; no row affected means
    /// `Cancelled` (unknown account or insufficient funds).
    async fn apply_order_created(
        &self,
        message_id: &str,
        event: &OrderCreated,
        reply_topic: &str,
    ) -> Result<InboxOutcome<PaymentStatus>>;
}

// ============================================================================
// Factory
// ============================================================================

/// Storage handles for one service, all backed by the same store.
#[derive(Clone)]
pub struct LedgerHandles {
    pub orders: Arc<dyn OrderLedger>,
    pub accounts: Arc<dyn AccountLedger>,
    pub outbox: Arc<dyn OutboxStore>,
    pub inbox: Arc<dyn InboxStore>,
}

impl LedgerHandles {
    pub fn from_ledger<L>(ledger: Arc<L>) -> Self
    where
        L: OrderLedger + AccountLedger + OutboxStore + InboxStore + 'static,
    {
        Self {
            orders: ledger.clone(),
            accounts: ledger.clone(),
            outbox: ledger.clone(),
            inbox: ledger,
        }
    }
}

/// Initialize storage for one service based on configuration.
///
/// Creates the tables the role needs if they do not exist.
pub async fn init_storage(
    config: &StorageConfig,
    role: ServiceRole,
) -> std::result::Result<LedgerHandles, Box<dyn std::error::Error + Send + Sync>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(role = %role, storage_type = "memory", "Storage initialized");
            Ok(LedgerHandles::from_ledger(Arc::new(InMemoryLedger::new())))
        }
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let path = config.sqlite.path_for(role);
                if let Some(parent) = std::path::Path::new(&path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let ledger = SqliteLedger::connect(&path).await?;
                ledger.init(role).await?;
                info!(role = %role, storage_type = "sqlite", path = %path, "Storage initialized");
                Ok(LedgerHandles::from_ledger(Arc::new(ledger)))
            }

            #[cfg(not(feature = "sqlite"))]
            {
                tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
                Err("SQLite feature not enabled".into())
            }
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let ledger =
                    PostgresLedger::connect(&config.postgres.uri, config.postgres.max_connections)
                        .await?;
                ledger.init(role).await?;
                info!(role = %role, storage_type = "postgres", "Storage initialized");
                Ok(LedgerHandles::from_ledger(Arc::new(ledger)))
            }

            #[cfg(not(feature = "postgres"))]
            {
                tracing::error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
                Err("PostgreSQL feature not enabled".into())
            }
        }
    }
}
