//! Order repository for database operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use shelf_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{NewOrder, Order};

macro_rules! order_columns {
    () => {
        "id, user_id, product_id, amount, status, external_ref, created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    product_id: i32,
    amount: Decimal,
    status: String,
    external_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let amount = Price::new(row.amount).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid amount for order {}: {e}", row.id))
        })?;
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            amount,
            status,
            external_ref: row.external_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the external reference was already recorded.
    pub async fn create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            r#"INSERT INTO shelf."order" (user_id, product_id, amount, status, external_ref)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING "#,
            order_columns!()
        ))
        .bind(new.user_id.as_i32())
        .bind(new.product_id.as_i32())
        .bind(new.amount.amount())
        .bind(new.status.as_str())
        .bind(new.external_ref.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "order reference"))?;

        Order::try_from(row)
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM shelf."order" WHERE id = $1"#
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Get an order by payment processor reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM shelf."order" WHERE external_ref = $1"#
        ))
        .bind(external_ref)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Set an order's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            r#"UPDATE shelf."order" SET status = $2, updated_at = NOW()
               WHERE id = $1
               RETURNING "#,
            order_columns!()
        ))
        .bind(id.as_i32())
        .bind(status.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Most recent settled order for a user and product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_settled(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM shelf."order"
                WHERE user_id = $1 AND product_id = $2
                  AND status IN ('completed', 'refunded')
                ORDER BY created_at DESC, id DESC
                LIMIT 1"#
        ))
        .bind(user_id.as_i32())
        .bind(product_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM shelf."order" WHERE user_id = $1 ORDER BY created_at DESC, id DESC"#
        ))
        .bind(user_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        into_orders(rows)
    }

    /// All orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r#" FROM shelf."order" ORDER BY created_at DESC, id DESC"#
        ))
        .fetch_all(self.pool)
        .await?;

        into_orders(rows)
    }

    /// Completed sales total and overall order count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self) -> Result<(Decimal, i64), RepositoryError> {
        let totals: (Decimal, i64) = sqlx::query_as(
            r#"SELECT
                 COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS total_sales,
                 COUNT(*) AS total_orders
               FROM shelf."order""#,
        )
        .fetch_one(self.pool)
        .await?;

        Ok(totals)
    }
}
