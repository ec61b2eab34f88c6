//! Funds ledger over SQL.
//!
//! The debit for an order is a single conditional update
//! (`balance = balance - amount WHERE balance >= amount`), so concurrent
//! debits against one account can never take it below zero.

use super::SqlDatabase;

/// Macro to implement `AccountLedger` for a specific SQL backend.
macro_rules! impl_account_ledger {
    ($db_type:ty, $conn:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl super::SqlLedger<$db_type> {
            async fn fetch_account(
                conn: &mut $conn,
                user_id: uuid::Uuid,
            ) -> crate::storage::Result<Option<crate::domain::Account>> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::Accounts;

                let stmt = Query::select()
                    .column(Accounts::Balance)
                    .from(Accounts::Table)
                    .and_where(Expr::col(Accounts::UserId).eq(user_id.to_string()))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_optional(&mut *conn).await?;
                match row {
                    Some(row) => Ok(Some(crate::domain::Account {
                        user_id,
                        balance: row.try_get("balance")?,
                    })),
                    None => Ok(None),
                }
            }

            /// Debit `amount` if the balance covers it. `true` when a row
            /// changed.
            async fn try_debit(
                conn: &mut $conn,
                user_id: uuid::Uuid,
                amount: i64,
            ) -> crate::storage::Result<bool> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Accounts;

                if amount <= 0 {
                    return Ok(false);
                }

                let stmt = Query::update()
                    .table(Accounts::Table)
                    .value(Accounts::Balance, Expr::col(Accounts::Balance).sub(amount))
                    .and_where(Expr::col(Accounts::UserId).eq(user_id.to_string()))
                    .and_where(Expr::col(Accounts::Balance).gte(amount))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let result = sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(result.rows_affected() == 1)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::AccountLedger for super::SqlLedger<$db_type> {
            async fn create_account(
                &self,
                user_id: uuid::Uuid,
            ) -> crate::storage::Result<crate::domain::Account> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::Accounts;
                use crate::storage::StorageError;

                let stmt = Query::insert()
                    .into_table(Accounts::Table)
                    .columns([Accounts::UserId, Accounts::Balance])
                    .values_panic([user_id.to_string().into(), 0i64.into()])
                    .on_conflict(OnConflict::column(Accounts::UserId).do_nothing().to_owned())
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                if result.rows_affected() == 0 {
                    return Err(StorageError::DuplicateAccount(user_id));
                }
                Ok(crate::domain::Account::empty(user_id))
            }

            async fn deposit(
                &self,
                user_id: uuid::Uuid,
                amount: i64,
            ) -> crate::storage::Result<crate::domain::Account> {
                use sea_query::{Expr, Query};

                use crate::domain::{positive_amount, ValidationError};
                use crate::storage::schema::Accounts;
                use crate::storage::StorageError;

                let amount = positive_amount(amount)?;
                // Credit only while the sum still fits in an i64.
                let stmt = Query::update()
                    .table(Accounts::Table)
                    .value(Accounts::Balance, Expr::col(Accounts::Balance).add(amount))
                    .and_where(Expr::col(Accounts::UserId).eq(user_id.to_string()))
                    .and_where(Expr::col(Accounts::Balance).lte(i64::MAX - amount))
                    .to_owned();
                let sql = <$db_type>::build_update(stmt);

                let mut tx = self.pool.begin().await?;
                let updated = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
                let account = Self::fetch_account(&mut *tx, user_id)
                    .await?
                    .ok_or(StorageError::AccountNotFound(user_id))?;
                if updated == 0 {
                    return Err(ValidationError::BalanceOverflow { user_id, amount }.into());
                }
                tx.commit().await?;

                Ok(account)
            }

            async fn get_account(
                &self,
                user_id: uuid::Uuid,
            ) -> crate::storage::Result<Option<crate::domain::Account>> {
                let mut conn = self.pool.acquire().await?;
                Self::fetch_account(&mut *conn, user_id).await
            }

            async fn apply_order_created(
                &self,
                message_id: &str,
                event: &crate::domain::OrderCreated,
                reply_topic: &str,
            ) -> crate::storage::Result<crate::storage::InboxOutcome<crate::domain::PaymentStatus>>
            {
                use crate::bus::outbox::NewOutboxEntry;
                use crate::domain::{PaymentOutcome, PaymentStatus};
                use crate::storage::InboxOutcome;

                let mut tx = self.pool.begin().await?;
                if !Self::insert_inbox(&mut *tx, message_id).await? {
                    tx.commit().await?;
                    return Ok(InboxOutcome::Duplicate);
                }

                let status = if Self::try_debit(&mut *tx, event.user_id, event.amount).await? {
                    PaymentStatus::Finished
                } else {
                    PaymentStatus::Cancelled
                };

                let reply = NewOutboxEntry::for_event(
                    reply_topic,
                    event.order_id,
                    &PaymentOutcome {
                        order_id: event.order_id,
                        status,
                    },
                )?;
                Self::insert_outbox(&mut *tx, &reply).await?;
                tx.commit().await?;

                Ok(InboxOutcome::Applied(status))
            }
        }
    };
}

// Generate implementations for each SQL backend
#[cfg(feature = "postgres")]
impl_account_ledger!(super::postgres::Postgres, sqlx::PgConnection, "postgres");
#[cfg(feature = "sqlite")]
impl_account_ledger!(super::sqlite::Sqlite, sqlx::SqliteConnection, "sqlite");
