//! Order ledger over SQL.

use super::SqlDatabase;

/// Macro to implement `OrderLedger` for a specific SQL backend.
macro_rules! impl_order_ledger {
    ($db_type:ty, $row:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl super::SqlLedger<$db_type> {
            fn order_from_row(row: &$row) -> crate::storage::Result<crate::domain::Order> {
                use sqlx::Row;

                use crate::storage::helpers::{parse_timestamp, parse_uuid};
                use crate::storage::StorageError;

                let id: String = row.try_get("id")?;
                let user_id: String = row.try_get("user_id")?;
                let status: String = row.try_get("status")?;
                let created_at: String = row.try_get("created_at")?;

                Ok(crate::domain::Order {
                    id: parse_uuid(&id)?,
                    user_id: parse_uuid(&user_id)?,
                    amount: row.try_get("amount")?,
                    description: row.try_get("description")?,
                    status: status
                        .parse()
                        .map_err(|e| StorageError::Corrupt(format!("order {id}: {e}")))?,
                    created_at: parse_timestamp(&created_at)?,
                })
            }

            fn order_select() -> sea_query::SelectStatement {
                use sea_query::Query;

                use crate::storage::schema::Orders;

                Query::select()
                    .columns([
                        Orders::Id,
                        Orders::UserId,
                        Orders::Amount,
                        Orders::Description,
                        Orders::Status,
                        Orders::CreatedAt,
                    ])
                    .from(Orders::Table)
                    .to_owned()
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OrderLedger for super::SqlLedger<$db_type> {
            async fn create_order(
                &self,
                order: crate::domain::NewOrder,
                topic: &str,
            ) -> crate::storage::Result<crate::domain::Order> {
                use sea_query::Query;

                use crate::bus::outbox::NewOutboxEntry;
                use crate::domain::OrderCreated;
                use crate::storage::helpers::format_timestamp;
                use crate::storage::schema::Orders;

                let order = order.into_order();
                let entry = NewOutboxEntry::for_event(
                    topic,
                    order.id,
                    &OrderCreated {
                        order_id: order.id,
                        user_id: order.user_id,
                        amount: order.amount,
                    },
                )?;

                let stmt = Query::insert()
                    .into_table(Orders::Table)
                    .columns([
                        Orders::Id,
                        Orders::UserId,
                        Orders::Amount,
                        Orders::Description,
                        Orders::Status,
                        Orders::CreatedAt,
                    ])
                    .values_panic([
                        order.id.to_string().into(),
                        order.user_id.to_string().into(),
                        order.amount.into(),
                        order.description.clone().into(),
                        order.status.as_str().into(),
                        format_timestamp(&order.created_at).into(),
                    ])
                    .to_owned();
                let sql = <$db_type>::build_insert(stmt);

                let mut tx = self.pool.begin().await?;
                sqlx::query(&sql).execute(&mut *tx).await?;
                Self::insert_outbox(&mut *tx, &entry).await?;
                tx.commit().await?;

                Ok(order)
            }

            async fn get_order(
                &self,
                id: uuid::Uuid,
            ) -> crate::storage::Result<Option<crate::domain::Order>> {
                use sea_query::Expr;

                use crate::storage::schema::Orders;

                let sql = {
                    let mut stmt = Self::order_select();
                    stmt.and_where(Expr::col(Orders::Id).eq(id.to_string()));
                    <$db_type>::build_select(stmt)
                };
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
                row.as_ref().map(Self::order_from_row).transpose()
            }

            async fn list_orders(
                &self,
                user_id: uuid::Uuid,
            ) -> crate::storage::Result<Vec<crate::domain::Order>> {
                use sea_query::{Expr, Order as SortOrder};

                use crate::storage::schema::Orders;

                let sql = {
                    let mut stmt = Self::order_select();
                    stmt.and_where(Expr::col(Orders::UserId).eq(user_id.to_string()))
                        .order_by(Orders::CreatedAt, SortOrder::Desc)
                        .order_by(Orders::Id, SortOrder::Desc);
                    <$db_type>::build_select(stmt)
                };
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                rows.iter().map(Self::order_from_row).collect()
            }

            async fn apply_payment_outcome(
                &self,
                message_id: &str,
                outcome: &crate::domain::PaymentOutcome,
            ) -> crate::storage::Result<crate::storage::InboxOutcome<crate::storage::StatusChange>>
            {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::domain::OrderStatus;
                use crate::storage::helpers::parse_uuid;
                use crate::storage::schema::Orders;
                use crate::storage::{InboxOutcome, StatusChange};

                let status = OrderStatus::from(outcome.status);
                let order_id = outcome.order_id.to_string();

                let mut tx = self.pool.begin().await?;
                if !Self::insert_inbox(&mut *tx, message_id).await? {
                    tx.commit().await?;
                    return Ok(InboxOutcome::Duplicate);
                }

                let update = Query::update()
                    .table(Orders::Table)
                    .value(Orders::Status, status.as_str())
                    .and_where(Expr::col(Orders::Id).eq(order_id.clone()))
                    .to_owned();
                let sql = <$db_type>::build_update(update);
                let updated = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();

                let change = if updated == 0 {
                    StatusChange::OrderNotFound
                } else {
                    let select = Query::select()
                        .column(Orders::UserId)
                        .from(Orders::Table)
                        .and_where(Expr::col(Orders::Id).eq(order_id))
                        .to_owned();
                    let sql = <$db_type>::build_select(select);
                    let row = sqlx::query(&sql).fetch_one(&mut *tx).await?;
                    let user_id: String = row.try_get("user_id")?;
                    StatusChange::Updated {
                        user_id: parse_uuid(&user_id)?,
                        status,
                    }
                };

                tx.commit().await?;
                Ok(InboxOutcome::Applied(change))
            }
        }
    };
}

// Generate implementations for each SQL backend
#[cfg(feature = "postgres")]
impl_order_ledger!(super::postgres::Postgres, sqlx::postgres::PgRow, "postgres");
#[cfg(feature = "sqlite")]
impl_order_ledger!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow, "sqlite");
