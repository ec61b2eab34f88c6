//! SQL database abstraction trait.

use crate::config::ServiceRole;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the sqlx backend type, query rendering and the row-claim mode.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The sqlx database driver.
    type Backend: sqlx::Database;

    /// Whether claimed outbox rows stay locked in an open transaction.
    /// Without row locks, claims commit their read immediately and are kept
    /// apart in process.
    const ROW_LOCKS: bool;

    /// Build a SQL query string from a sea-query SELECT statement.
    fn build_select(stmt: sea_query::SelectStatement) -> String;

    /// Build a SQL query string from a sea-query INSERT statement.
    fn build_insert(stmt: sea_query::InsertStatement) -> String;

    /// Build a SQL query string from a sea-query UPDATE statement.
    fn build_update(stmt: sea_query::UpdateStatement) -> String;

    /// Apply the backend's row-claim mode to an outbox claim query.
    fn claim_lock(stmt: &mut sea_query::SelectStatement);

    /// DDL for the tables `role` owns.
    fn schema(role: ServiceRole) -> [&'static str; 3];
}
