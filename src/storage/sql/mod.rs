//! Unified SQL storage implementations.
//!
//! This module provides shared implementations for SQL-based ledger backends
//! (PostgreSQL, SQLite). The implementations are parameterized by database type
//! using the `SqlDatabase` trait.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

mod accounts;
mod orders;
mod outbox;
mod query;

pub use outbox::SqlOutboxClaim;
pub use query::SqlDatabase;

/// Outbox rows held by open claims of this process.
///
/// Used by backends without row locks. `releases` counts released claims so
/// a claimer can tell that rows it read may have been published meanwhile.
#[derive(Debug, Default)]
pub(crate) struct ClaimRegistry {
    held: HashSet<i64>,
    releases: u64,
}

impl ClaimRegistry {
    fn release(&mut self, seqs: impl IntoIterator<Item = i64>) {
        for seq in seqs {
            self.held.remove(&seq);
        }
        self.releases += 1;
    }
}

type SharedClaims = Arc<Mutex<ClaimRegistry>>;

fn lock_claims(claims: &Mutex<ClaimRegistry>) -> MutexGuard<'_, ClaimRegistry> {
    claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// SQL-based implementation of every ledger trait.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlLedger<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Backend>,
    claims: SharedClaims,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlLedger<DB> {
    /// Create a new SQL ledger with the given pool.
    pub fn new(pool: sqlx::Pool<DB::Backend>) -> Self {
        Self {
            pool,
            claims: SharedClaims::default(),
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &sqlx::Pool<DB::Backend> {
        &self.pool
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::{LockBehavior, LockType, PostgresQueryBuilder};
    use sqlx::postgres::PgPoolOptions;

    use crate::config::ServiceRole;
    use crate::storage::Result;
    use crate::utils::bootstrap::connect_with_retry;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Backend = sqlx::Postgres;

        const ROW_LOCKS: bool = true;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn claim_lock(stmt: &mut sea_query::SelectStatement) {
            stmt.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
        }

        fn schema(role: ServiceRole) -> [&'static str; 3] {
            crate::storage::schema::postgres::for_role(role)
        }
    }

    /// PostgreSQL ledger.
    pub type PostgresLedger = super::SqlLedger<Postgres>;

    impl PostgresLedger {
        /// Connect with startup retry.
        pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
            let pool = connect_with_retry("postgres", || {
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(uri)
            })
            .await?;
            Ok(Self::new(pool))
        }

        /// Create the role's tables if they do not exist.
        pub async fn init(&self, role: ServiceRole) -> Result<()> {
            for ddl in <Postgres as super::SqlDatabase>::schema(role) {
                sqlx::raw_sql(ddl).execute(self.pool()).await?;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.
    //!
    //! SQLite has no row locks and the pool holds a single connection, so
    //! ledger transactions run one at a time. Outbox claims do not keep a
    //! transaction open: the read commits at once, each mark is its own
    //! statement, and claims of this process skip each other's rows through
    //! the ledger's claim registry. A slow broker never holds the connection.

    use std::str::FromStr;
    use std::time::Duration;

    use sea_query::SqliteQueryBuilder;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

    use crate::config::ServiceRole;
    use crate::storage::Result;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Backend = sqlx::Sqlite;

        const ROW_LOCKS: bool = false;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn claim_lock(_stmt: &mut sea_query::SelectStatement) {}

        fn schema(role: ServiceRole) -> [&'static str; 3] {
            crate::storage::schema::sqlite::for_role(role)
        }
    }

    /// SQLite ledger.
    pub type SqliteLedger = super::SqlLedger<Sqlite>;

    impl SqliteLedger {
        /// Open (creating if missing) the database file at `path`.
        pub async fn connect(path: &str) -> Result<Self> {
            let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            Self::with_options(options).await
        }

        /// Private in-memory database. Lives as long as the ledger.
        pub async fn connect_in_memory() -> Result<Self> {
            Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:")?).await
        }

        async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;
            Ok(Self::new(pool))
        }

        /// Create the role's tables if they do not exist.
        pub async fn init(&self, role: ServiceRole) -> Result<()> {
            for ddl in <Sqlite as super::SqlDatabase>::schema(role) {
                sqlx::raw_sql(ddl).execute(self.pool()).await?;
            }
            Ok(())
        }
    }
}
