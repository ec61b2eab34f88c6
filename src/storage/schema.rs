//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the DDL each backend runs at startup.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "amount"]
    Amount,
    #[iden = "description"]
    Description,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
}

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "balance"]
    Balance,
}

/// Outbox table schema.
#[derive(Iden)]
pub enum Outbox {
    Table,
    #[iden = "seq"]
    Seq,
    #[iden = "id"]
    Id,
    #[iden = "topic"]
    Topic,
    #[iden = "message_key"]
    MessageKey,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "published"]
    Published,
}

/// Inbox table schema.
#[derive(Iden)]
pub enum Inbox {
    Table,
    #[iden = "message_id"]
    MessageId,
    #[iden = "received_at"]
    ReceivedAt,
}

/// PostgreSQL DDL.
pub mod postgres {
    use crate::config::ServiceRole;

    /// Tables a service owns, in creation order.
    pub fn for_role(role: ServiceRole) -> [&'static str; 3] {
        match role {
            ServiceRole::Orders => [CREATE_ORDERS_TABLE, CREATE_OUTBOX_TABLE, CREATE_INBOX_TABLE],
            ServiceRole::Payments => [CREATE_ACCOUNTS_TABLE, CREATE_OUTBOX_TABLE, CREATE_INBOX_TABLE],
        }
    }

    pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount BIGINT NOT NULL CHECK (amount > 0),
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);
"#;

    pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0)
);
"#;

    pub const CREATE_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox (
    seq BIGSERIAL PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    topic TEXT NOT NULL,
    message_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    published BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(created_at, seq) WHERE published = FALSE;
"#;

    pub const CREATE_INBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inbox (
    message_id TEXT PRIMARY KEY,
    received_at TEXT NOT NULL
);
"#;
}

/// SQLite DDL.
pub mod sqlite {
    use crate::config::ServiceRole;

    /// Tables a service owns, in creation order.
    pub fn for_role(role: ServiceRole) -> [&'static str; 3] {
        match role {
            ServiceRole::Orders => [CREATE_ORDERS_TABLE, CREATE_OUTBOX_TABLE, CREATE_INBOX_TABLE],
            ServiceRole::Payments => [CREATE_ACCOUNTS_TABLE, CREATE_OUTBOX_TABLE, CREATE_INBOX_TABLE],
        }
    }

    pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);
"#;

    pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
);
"#;

    pub const CREATE_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    topic TEXT NOT NULL,
    message_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    published BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(published, created_at, seq);
"#;

    pub const CREATE_INBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inbox (
    message_id TEXT PRIMARY KEY,
    received_at TEXT NOT NULL
);
"#;
}
