//! Unified SQL outbox and inbox implementations.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use super::{lock_claims, SharedClaims, SqlDatabase};
use crate::bus::outbox::OutboxEntry;

/// Claimed outbox entries.
///
/// With row locks (PostgreSQL) the claim holds an open transaction: rows stay
/// locked (`FOR UPDATE SKIP LOCKED`), marks run on that transaction and
/// commit or roll back together, so a failed mark or a dropped claim makes the
/// whole batch publish again.
///
/// Without row locks (SQLite) no transaction is held. Each mark is an
/// independent statement through the pool and the claimed rows are kept out
/// of other claims of this process until commit or drop.
pub struct SqlOutboxClaim<DB: SqlDatabase> {
    tx: Option<sqlx::Transaction<'static, DB::Backend>>,
    pool: sqlx::Pool<DB::Backend>,
    claims: SharedClaims,
    entries: Vec<OutboxEntry>,
    released: bool,
}

impl<DB: SqlDatabase> SqlOutboxClaim<DB> {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !DB::ROW_LOCKS {
            lock_claims(&self.claims).release(self.entries.iter().map(|e| e.seq));
        }
    }
}

impl<DB: SqlDatabase> Drop for SqlOutboxClaim<DB> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Macro to implement the outbox/inbox traits for a specific SQL backend.
///
/// Also generates the in-transaction helpers the ledger macros use to write
/// outbox and inbox rows.
macro_rules! impl_outbox_store {
    ($db_type:ty, $conn:ty, $row:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl super::SqlLedger<$db_type> {
            /// Append an outbox row on an open transaction.
            pub(super) async fn insert_outbox(
                conn: &mut $conn,
                entry: &crate::bus::outbox::NewOutboxEntry,
            ) -> crate::storage::Result<()> {
                use sea_query::Query;

                use crate::storage::helpers::format_timestamp;
                use crate::storage::schema::Outbox;

                let stmt = Query::insert()
                    .into_table(Outbox::Table)
                    .columns([
                        Outbox::Id,
                        Outbox::Topic,
                        Outbox::MessageKey,
                        Outbox::Payload,
                        Outbox::CreatedAt,
                        Outbox::Published,
                    ])
                    .values_panic([
                        entry.id.to_string().into(),
                        entry.topic.clone().into(),
                        entry.message_key.clone().into(),
                        entry.payload.clone().into(),
                        format_timestamp(&entry.created_at).into(),
                        false.into(),
                    ])
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            }

            /// Conditionally record a message id. `false` means it was
            /// already present and the caller must not apply the effect.
            pub(super) async fn insert_inbox(
                conn: &mut $conn,
                message_id: &str,
            ) -> crate::storage::Result<bool> {
                use sea_query::{OnConflict, Query};

                use crate::storage::helpers::{format_timestamp, now};
                use crate::storage::schema::Inbox;

                let stmt = Query::insert()
                    .into_table(Inbox::Table)
                    .columns([Inbox::MessageId, Inbox::ReceivedAt])
                    .values_panic([message_id.into(), format_timestamp(&now()).into()])
                    .on_conflict(OnConflict::column(Inbox::MessageId).do_nothing().to_owned())
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                let result = sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(result.rows_affected() == 1)
            }

            fn outbox_entry_from_row(row: &$row) -> crate::storage::Result<OutboxEntry> {
                use sqlx::Row;

                use crate::storage::helpers::{parse_timestamp, parse_uuid};

                let id: String = row.try_get("id")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(OutboxEntry {
                    seq: row.try_get("seq")?,
                    id: parse_uuid(&id)?,
                    topic: row.try_get("topic")?,
                    message_key: row.try_get("message_key")?,
                    payload: row.try_get("payload")?,
                    created_at: parse_timestamp(&created_at)?,
                    published: row.try_get("published")?,
                })
            }

            fn outbox_select() -> sea_query::SelectStatement {
                use sea_query::{Order as SortOrder, Query};

                use crate::storage::schema::Outbox;

                Query::select()
                    .columns([
                        Outbox::Seq,
                        Outbox::Id,
                        Outbox::Topic,
                        Outbox::MessageKey,
                        Outbox::Payload,
                        Outbox::CreatedAt,
                        Outbox::Published,
                    ])
                    .from(Outbox::Table)
                    .order_by(Outbox::CreatedAt, SortOrder::Asc)
                    .order_by(Outbox::Seq, SortOrder::Asc)
                    .to_owned()
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxClaim for SqlOutboxClaim<$db_type> {
            fn entries(&self) -> &[OutboxEntry] {
                &self.entries
            }

            async fn mark_published(&mut self, id: uuid::Uuid) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Outbox;
                use crate::storage::StorageError;

                if self.released {
                    return Err(StorageError::Corrupt("claim already committed".into()));
                }
                if !self.entries.iter().any(|e| e.id == id) {
                    return Err(StorageError::Corrupt(format!(
                        "entry {id} is not part of this claim"
                    )));
                }

                let sql = <$db_type>::build_update(
                    Query::update()
                        .table(Outbox::Table)
                        .value(Outbox::Published, true)
                        .and_where(Expr::col(Outbox::Id).eq(id.to_string()))
                        .to_owned(),
                );

                match self.tx.as_mut() {
                    Some(tx) => sqlx::query(&sql).execute(&mut **tx).await?,
                    None => sqlx::query(&sql).execute(&self.pool).await?,
                };
                Ok(())
            }

            async fn commit(&mut self) -> crate::storage::Result<()> {
                if let Some(tx) = self.tx.take() {
                    tx.commit().await?;
                }
                self.release();
                Ok(())
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxStore for super::SqlLedger<$db_type> {
            async fn claim_pending(
                &self,
                limit: usize,
            ) -> crate::storage::Result<Box<dyn crate::storage::OutboxClaim>> {
                use sea_query::Expr;

                use crate::storage::schema::Outbox;

                if <$db_type>::ROW_LOCKS {
                    let sql = {
                        let mut stmt = Self::outbox_select();
                        stmt.and_where(Expr::col(Outbox::Published).eq(false))
                            .limit(limit as u64);
                        <$db_type>::claim_lock(&mut stmt);
                        <$db_type>::build_select(stmt)
                    };

                    let mut tx = self.pool.begin().await?;
                    let rows = sqlx::query(&sql).fetch_all(&mut *tx).await?;
                    let entries = rows
                        .iter()
                        .map(Self::outbox_entry_from_row)
                        .collect::<crate::storage::Result<Vec<_>>>()?;

                    return Ok(Box::new(SqlOutboxClaim::<$db_type> {
                        tx: Some(tx),
                        pool: self.pool.clone(),
                        claims: self.claims.clone(),
                        entries,
                        released: false,
                    }));
                }

                // Read, then take the rows no other claim holds. Retry the
                // read if a claim was released in between, since its rows
                // may have been published after we read them.
                let entries = loop {
                    let (held, releases) = {
                        let claims = lock_claims(&self.claims);
                        (claims.held.len(), claims.releases)
                    };
                    let sql = {
                        let mut stmt = Self::outbox_select();
                        stmt.and_where(Expr::col(Outbox::Published).eq(false))
                            .limit((limit + held) as u64);
                        <$db_type>::build_select(stmt)
                    };

                    let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                    let mut entries = rows
                        .iter()
                        .map(Self::outbox_entry_from_row)
                        .collect::<crate::storage::Result<Vec<_>>>()?;

                    let mut claims = lock_claims(&self.claims);
                    if claims.releases != releases {
                        continue;
                    }
                    entries.retain(|e| !claims.held.contains(&e.seq));
                    entries.truncate(limit);
                    claims.held.extend(entries.iter().map(|e| e.seq));
                    break entries;
                };

                Ok(Box::new(SqlOutboxClaim::<$db_type> {
                    tx: None,
                    pool: self.pool.clone(),
                    claims: self.claims.clone(),
                    entries,
                    released: false,
                }))
            }

            async fn list_outbox(&self) -> crate::storage::Result<Vec<OutboxEntry>> {
                let sql = <$db_type>::build_select(Self::outbox_select());
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                rows.iter().map(Self::outbox_entry_from_row).collect()
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::InboxStore for super::SqlLedger<$db_type> {
            async fn is_processed(&self, message_id: &str) -> crate::storage::Result<bool> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Inbox;

                let stmt = Query::select()
                    .column(Inbox::MessageId)
                    .from(Inbox::Table)
                    .and_where(Expr::col(Inbox::MessageId).eq(message_id))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
                Ok(row.is_some())
            }

            async fn inbox_len(&self) -> crate::storage::Result<usize> {
                use sea_query::{Expr, Func, Query};
                use sqlx::Row;

                use crate::storage::schema::Inbox;

                let stmt = Query::select()
                    .expr(Func::count(Expr::col(Inbox::MessageId)))
                    .from(Inbox::Table)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
                let count: i64 = row.try_get(0)?;
                Ok(count as usize)
            }
        }
    };
}

// Generate implementations for each SQL backend
#[cfg(feature = "postgres")]
impl_outbox_store!(
    super::postgres::Postgres,
    sqlx::PgConnection,
    sqlx::postgres::PgRow,
    "postgres"
);
#[cfg(feature = "sqlite")]
impl_outbox_store!(
    super::sqlite::Sqlite,
    sqlx::SqliteConnection,
    sqlx::sqlite::SqliteRow,
    "sqlite"
);
