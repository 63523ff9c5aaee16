//! Order and payment repository
//!
//! Every order has exactly one payment row. Status transitions are guarded
//! updates so concurrent verifications and webhooks settle a payment once.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    ListParams, NewOrder, Order, OrderStatus, Payment, PaymentFilter, PaymentStatus,
    PaymentWithOrder,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order (`created`) together with its pending payment
    async fn create(&self, order: &NewOrder) -> Result<(Order, Payment)>;

    async fn get_order(&self, id: i64) -> Result<Option<Order>>;

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>>;

    async fn set_gateway_order_id(&self, order_id: i64, gateway_order_id: &str) -> Result<()>;

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>>;

    async fn get_payment_by_order(&self, order_id: i64) -> Result<Option<Payment>>;

    /// `pending` or `failed` → `success` and order → `paid`. A failed
    /// attempt can be followed by a paid retry on the same gateway order.
    /// Returns false when the payment was already settled.
    async fn mark_success(
        &self,
        order_id: i64,
        gateway_payment_id: &str,
        signature: Option<&str>,
    ) -> Result<bool>;

    /// `pending` → `failed` and order → `failed`
    async fn mark_failed(
        &self,
        order_id: i64,
        gateway_payment_id: Option<&str>,
        reason: &str,
    ) -> Result<bool>;

    /// `success` → `refunding`. Only one caller wins the claim.
    async fn claim_refund(&self, payment_id: i64) -> Result<bool>;

    /// `refunding` → `success` after the gateway refused the refund
    async fn release_refund(&self, payment_id: i64) -> Result<bool>;

    /// `refunding` → `refunded`
    async fn mark_refunded(&self, payment_id: i64, refund_id: &str) -> Result<bool>;

    async fn list(
        &self,
        filter: &PaymentFilter,
        params: &ListParams,
    ) -> Result<(Vec<PaymentWithOrder>, i64)>;

    /// Number of successful payments and their summed amount
    async fn revenue(&self) -> Result<(i64, i64)>;
}

pub struct SqlxOrderRepository {
    pool: DynDatabasePool,
}

impl SqlxOrderRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }
}

const ORDER_COLUMNS: &str = "id, user_id, item_type, item_id, amount, original_amount, discount_amount, currency, referral_code, gateway_order_id, status, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "p.id, p.order_id, p.user_id, p.gateway_payment_id, p.signature, p.amount, p.currency, p.status, p.failure_reason, p.refund_id, p.created_at, p.updated_at";

const INSERT_ORDER: &str = r#"
    INSERT INTO orders (user_id, item_type, item_id, amount, original_amount, discount_amount,
                        currency, referral_code, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'created', ?, ?)
"#;

const INSERT_PAYMENT: &str = r#"
    INSERT INTO payments (order_id, user_id, amount, currency, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, 'pending', ?, ?)
"#;

const PAYMENT_SUCCESS: &str = r#"
    UPDATE payments
    SET status = 'success', gateway_payment_id = ?, signature = ?, failure_reason = NULL, updated_at = ?
    WHERE order_id = ? AND status IN ('pending', 'failed')
"#;

const PAYMENT_FAILED: &str = r#"
    UPDATE payments
    SET status = 'failed', gateway_payment_id = COALESCE(?, gateway_payment_id),
        failure_reason = ?, updated_at = ?
    WHERE order_id = ? AND status = 'pending'
"#;

const PAYMENT_TRANSITION: &str =
    "UPDATE payments SET status = ?, updated_at = ? WHERE id = ? AND status = ?";

const ORDER_STATUS: &str = "UPDATE orders SET status = ?, updated_at = ? WHERE id = ?";

const LIST_FILTER: &str = "WHERE (? IS NULL OR p.status = ?) AND (? IS NULL OR p.user_id = ?)";

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, order: &NewOrder) -> Result<(Order, Payment)> {
        let now = Utc::now();
        let (order_id, payment_id) = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_order_sqlite(self.pool.sqlite()?, order, now).await?,
            DatabaseDriver::Mysql => create_order_mysql(self.pool.mysql()?, order, now).await?,
        };
        Ok((
            Order {
                id: order_id,
                user_id: order.user_id,
                item_type: order.item_type,
                item_id: order.item_id,
                amount: order.amount,
                original_amount: order.original_amount,
                discount_amount: order.discount_amount,
                currency: order.currency.clone(),
                referral_code: order.referral_code.clone(),
                gateway_order_id: None,
                status: OrderStatus::Created,
                created_at: now,
                updated_at: now,
            },
            Payment {
                id: payment_id,
                order_id,
                user_id: order.user_id,
                gateway_payment_id: None,
                signature: None,
                amount: order.amount,
                currency: order.currency.clone(),
                status: PaymentStatus::Pending,
                failure_reason: None,
                refund_id: None,
                created_at: now,
                updated_at: now,
            },
        ))
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get order")?
                .as_ref()
                .map(row_to_order_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get order")?
                .as_ref()
                .map(row_to_order_mysql)),
        }
    }

    async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE gateway_order_id = ?", ORDER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(gateway_order_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get order by gateway id")?
                .as_ref()
                .map(row_to_order_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(gateway_order_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get order by gateway id")?
                .as_ref()
                .map(row_to_order_mysql)),
        }
    }

    async fn set_gateway_order_id(&self, order_id: i64, gateway_order_id: &str) -> Result<()> {
        execute!(
            self,
            "UPDATE orders SET gateway_order_id = ?, updated_at = ? WHERE id = ?",
            "Failed to store gateway order id",
            gateway_order_id,
            Utc::now(),
            order_id
        );
        Ok(())
    }

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments p WHERE p.id = ?", PAYMENT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get payment")?
                .as_ref()
                .map(row_to_payment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get payment")?
                .as_ref()
                .map(row_to_payment_mysql)),
        }
    }

    async fn get_payment_by_order(&self, order_id: i64) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments p WHERE p.order_id = ?", PAYMENT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(order_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get payment by order")?
                .as_ref()
                .map(row_to_payment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(order_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get payment by order")?
                .as_ref()
                .map(row_to_payment_mysql)),
        }
    }

    async fn mark_success(
        &self,
        order_id: i64,
        gateway_payment_id: &str,
        signature: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let won = sqlx::query(PAYMENT_SUCCESS)
                    .bind(gateway_payment_id)
                    .bind(signature)
                    .bind(now)
                    .bind(order_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to mark payment successful")?
                    .rows_affected()
                    == 1;
                if won {
                    sqlx::query(ORDER_STATUS)
                        .bind(OrderStatus::Paid.as_str())
                        .bind(now)
                        .bind(order_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to mark order paid")?;
                }
                tx.commit().await?;
                Ok(won)
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                let won = sqlx::query(PAYMENT_SUCCESS)
                    .bind(gateway_payment_id)
                    .bind(signature)
                    .bind(now)
                    .bind(order_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to mark payment successful")?
                    .rows_affected()
                    == 1;
                if won {
                    sqlx::query(ORDER_STATUS)
                        .bind(OrderStatus::Paid.as_str())
                        .bind(now)
                        .bind(order_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to mark order paid")?;
                }
                tx.commit().await?;
                Ok(won)
            }
        }
    }

    async fn mark_failed(
        &self,
        order_id: i64,
        gateway_payment_id: Option<&str>,
        reason: &str,
    ) -> Result<bool> {
        let now = Utc::now();
        let affected = execute!(
            self,
            PAYMENT_FAILED,
            "Failed to mark payment failed",
            gateway_payment_id,
            reason,
            now,
            order_id
        );
        if affected == 0 {
            return Ok(false);
        }
        execute!(
            self,
            ORDER_STATUS,
            "Failed to mark order failed",
            OrderStatus::Failed.as_str(),
            now,
            order_id
        );
        Ok(true)
    }

    async fn claim_refund(&self, payment_id: i64) -> Result<bool> {
        let affected = execute!(
            self,
            PAYMENT_TRANSITION,
            "Failed to claim payment for refund",
            PaymentStatus::Refunding.as_str(),
            Utc::now(),
            payment_id,
            PaymentStatus::Success.as_str()
        );
        Ok(affected == 1)
    }

    async fn release_refund(&self, payment_id: i64) -> Result<bool> {
        let affected = execute!(
            self,
            PAYMENT_TRANSITION,
            "Failed to release refund claim",
            PaymentStatus::Success.as_str(),
            Utc::now(),
            payment_id,
            PaymentStatus::Refunding.as_str()
        );
        Ok(affected == 1)
    }

    async fn mark_refunded(&self, payment_id: i64, refund_id: &str) -> Result<bool> {
        let affected = execute!(
            self,
            "UPDATE payments SET status = 'refunded', refund_id = ?, updated_at = ? WHERE id = ? AND status = 'refunding'",
            "Failed to mark payment refunded",
            refund_id,
            Utc::now(),
            payment_id
        );
        Ok(affected == 1)
    }

    async fn list(
        &self,
        filter: &PaymentFilter,
        params: &ListParams,
    ) -> Result<(Vec<PaymentWithOrder>, i64)> {
        let status = filter.status.map(|s| s.as_str().to_string());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_payments_sqlite(self.pool.sqlite()?, status, filter.user_id, params).await
            }
            DatabaseDriver::Mysql => {
                list_payments_mysql(self.pool.mysql()?, status, filter.user_id, params).await
            }
        }
    }

    async fn revenue(&self) -> Result<(i64, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(
                    "SELECT COUNT(*) AS count, COALESCE(SUM(amount), 0) AS revenue FROM payments WHERE status = 'success'",
                )
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to compute revenue")?;
                Ok((row.get("count"), row.get("revenue")))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(
                    "SELECT COUNT(*) AS count, CAST(COALESCE(SUM(amount), 0) AS SIGNED) AS revenue FROM payments WHERE status = 'success'",
                )
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to compute revenue")?;
                Ok((row.get("count"), row.get("revenue")))
            }
        }
    }
}

fn list_sql() -> (String, String) {
    (
        format!(
            r#"
            SELECT {}, o.item_type, o.item_id, o.gateway_order_id, o.discount_amount
            FROM payments p JOIN orders o ON o.id = p.order_id
            {}
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT ? OFFSET ?
            "#,
            PAYMENT_COLUMNS, LIST_FILTER
        ),
        format!("SELECT COUNT(*) AS count FROM payments p {}", LIST_FILTER),
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_order_sqlite(pool: &SqlitePool, order: &NewOrder, now: DateTime<Utc>) -> Result<(i64, i64)> {
    let mut tx = pool.begin().await?;
    let order_id = sqlx::query(INSERT_ORDER)
        .bind(order.user_id)
        .bind(order.item_type.as_str())
        .bind(order.item_id)
        .bind(order.amount)
        .bind(order.original_amount)
        .bind(order.discount_amount)
        .bind(&order.currency)
        .bind(&order.referral_code)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?
        .last_insert_rowid();
    let payment_id = sqlx::query(INSERT_PAYMENT)
        .bind(order_id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create payment")?
        .last_insert_rowid();
    tx.commit().await?;
    Ok((order_id, payment_id))
}

async fn list_payments_sqlite(
    pool: &SqlitePool,
    status: Option<String>,
    user_id: Option<i64>,
    params: &ListParams,
) -> Result<(Vec<PaymentWithOrder>, i64)> {
    let (sql, count_sql) = list_sql();
    let rows = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(user_id)
        .bind(user_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list payments")?;
    let total: i64 = sqlx::query(&count_sql)
        .bind(&status)
        .bind(&status)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to count payments")?
        .get("count");

    let items = rows
        .iter()
        .map(|row| {
            let item_type: String = row.get("item_type");
            PaymentWithOrder {
                payment: row_to_payment_sqlite(row),
                item_type: item_type.parse().unwrap_or_default(),
                item_id: row.get("item_id"),
                gateway_order_id: row.get("gateway_order_id"),
                discount_amount: row.get("discount_amount"),
            }
        })
        .collect();
    Ok((items, total))
}

fn row_to_order_sqlite(row: &sqlx::sqlite::SqliteRow) -> Order {
    let item_type: String = row.get("item_type");
    let status: String = row.get("status");
    Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        item_type: item_type.parse().unwrap_or_default(),
        item_id: row.get("item_id"),
        amount: row.get("amount"),
        original_amount: row.get("original_amount"),
        discount_amount: row.get("discount_amount"),
        currency: row.get("currency"),
        referral_code: row.get("referral_code"),
        gateway_order_id: row.get("gateway_order_id"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_payment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Payment {
    let status: String = row.get("status");
    Payment {
        id: row.get("id"),
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        signature: row.get("signature"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: status.parse().unwrap_or_default(),
        failure_reason: row.get("failure_reason"),
        refund_id: row.get("refund_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_order_mysql(pool: &MySqlPool, order: &NewOrder, now: DateTime<Utc>) -> Result<(i64, i64)> {
    let mut tx = pool.begin().await?;
    let order_id = sqlx::query(INSERT_ORDER)
        .bind(order.user_id)
        .bind(order.item_type.as_str())
        .bind(order.item_id)
        .bind(order.amount)
        .bind(order.original_amount)
        .bind(order.discount_amount)
        .bind(&order.currency)
        .bind(&order.referral_code)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?
        .last_insert_id() as i64;
    let payment_id = sqlx::query(INSERT_PAYMENT)
        .bind(order_id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create payment")?
        .last_insert_id() as i64;
    tx.commit().await?;
    Ok((order_id, payment_id))
}

async fn list_payments_mysql(
    pool: &MySqlPool,
    status: Option<String>,
    user_id: Option<i64>,
    params: &ListParams,
) -> Result<(Vec<PaymentWithOrder>, i64)> {
    let (sql, count_sql) = list_sql();
    let rows = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(user_id)
        .bind(user_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list payments")?;
    let total: i64 = sqlx::query(&count_sql)
        .bind(&status)
        .bind(&status)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to count payments")?
        .get("count");

    let items = rows
        .iter()
        .map(|row| {
            let item_type: String = row.get("item_type");
            PaymentWithOrder {
                payment: row_to_payment_mysql(row),
                item_type: item_type.parse().unwrap_or_default(),
                item_id: row.get("item_id"),
                gateway_order_id: row.get("gateway_order_id"),
                discount_amount: row.get("discount_amount"),
            }
        })
        .collect();
    Ok((items, total))
}

fn row_to_order_mysql(row: &sqlx::mysql::MySqlRow) -> Order {
    let item_type: String = row.get("item_type");
    let status: String = row.get("status");
    Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        item_type: item_type.parse().unwrap_or_default(),
        item_id: row.get("item_id"),
        amount: row.get("amount"),
        original_amount: row.get("original_amount"),
        discount_amount: row.get("discount_amount"),
        currency: row.get("currency"),
        referral_code: row.get("referral_code"),
        gateway_order_id: row.get("gateway_order_id"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_payment_mysql(row: &sqlx::mysql::MySqlRow) -> Payment {
    let status: String = row.get("status");
    Payment {
        id: row.get("id"),
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        signature: row.get("signature"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: status.parse().unwrap_or_default(),
        failure_reason: row.get("failure_reason"),
        refund_id: row.get("refund_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
