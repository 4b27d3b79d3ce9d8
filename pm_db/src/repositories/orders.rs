//! ABOUTME: Order repository with line items, status transitions and seller earnings
//! ABOUTME: Order creation and transitions run in transactions with guarded updates

use pm_core::{numbering, now_iso8601, Error, Id, OrderStatus, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::{map_db_error, PageRequest};

const ORDER_COLUMNS: &str = "id, order_number, buyer_id, status, subtotal_cents, platform_fee_cents, total_cents, currency, payment_reference, paid_at, completed_at, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, seller_id, title, price_cents, platform_fee_cents, seller_amount_cents";

/// Attempts at drawing an unused order number
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub buyer_id: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub paid_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus> {
        self.status.parse()
    }
}

/// Order line entity; title and price are snapshots taken at purchase
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub seller_amount_cents: i64,
}

/// A priced order ready to insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub items: Vec<NewOrderItem>,
}

/// What a seller has earned from completed orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SellerEarning {
    /// All completed sales
    pub earned_cents: i64,
    /// Completed sales that are past the hold period
    pub available_cents: i64,
}

/// Order repository
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an order and its items in one transaction
    ///
    /// A fresh order number is drawn when the previous one is already taken.
    #[instrument(skip(self, order), fields(buyer_id = %order.buyer_id, items = order.items.len()))]
    pub async fn create(&self, order: &NewOrder) -> Result<(Order, Vec<OrderItem>)> {
        let mut last_error = None;

        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let number = numbering::next_order_number();
            match self.insert(order, &number).await {
                Ok(created) => return Ok(created),
                Err(Error::Conflict(msg)) => {
                    warn!("Order number {} taken (attempt {}): {}", number, attempt, msg);
                    last_error = Some(Error::Conflict(msg));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Conflict("Could not allocate an order number".to_string())
        }))
    }

    async fn insert(&self, order: &NewOrder, number: &str) -> Result<(Order, Vec<OrderItem>)> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let created = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (id, order_number, buyer_id, status, subtotal_cents, platform_fee_cents, total_cents, currency, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&id)
        .bind(number)
        .bind(&order.buyer_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(order.subtotal_cents)
        .bind(order.platform_fee_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error("Failed to create order", e))?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let row = sqlx::query_as::<_, OrderItem>(&format!(
                r#"
                INSERT INTO order_items (id, order_id, product_id, seller_id, title, price_cents, platform_fee_cents, seller_amount_cents)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                RETURNING {}
                "#,
                ITEM_COLUMNS
            ))
            .bind(Id::new().to_string())
            .bind(&id)
            .bind(&item.product_id)
            .bind(&item.seller_id)
            .bind(&item.title)
            .bind(item.price_cents)
            .bind(item.platform_fee_cents)
            .bind(item.seller_amount_cents)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to create order item: {}", e)))?;
            items.push(row);
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Created order {} ({})", created.id, created.order_number);
        Ok((created, items))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find order: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load order items: {}", e)))
    }

    /// A buyer's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_by_buyer(&self, buyer_id: &str, page: PageRequest) -> Result<Vec<Order>> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE buyer_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            ORDER_COLUMNS
        ))
        .bind(buyer_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list buyer orders: {}", e)))
    }

    /// All orders, optionally in one status, with the total match count
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, i64)> {
        let status = status.map(|s| s.as_str());

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE (?1 IS NULL OR status = ?1)")
                .bind(status)
                .fetch_one(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to count orders: {}", e)))?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {} FROM orders
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
            ORDER_COLUMNS
        ))
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list orders: {}", e)))?;

        Ok((orders, total))
    }

    /// Move an order from `expected` to `next`
    ///
    /// Entering PROCESSING stamps `paid_at` and stores `payment_reference`;
    /// entering COMPLETED stamps `completed_at`. Fails with `Conflict` when
    /// the order left `expected` in the meantime.
    #[instrument(skip(self, payment_reference))]
    pub async fn transition(
        &self,
        id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<Order> {
        expected.ensure_transition(next)?;

        let now = now_iso8601();
        let paid_at = (next == OrderStatus::Processing).then_some(now.as_str());
        let completed_at = (next == OrderStatus::Completed).then_some(now.as_str());

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = ?1,
                payment_reference = COALESCE(?2, payment_reference),
                paid_at = COALESCE(?3, paid_at),
                completed_at = COALESCE(?4, completed_at),
                updated_at = ?5
            WHERE id = ?6 AND status = ?7
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(next.as_str())
        .bind(payment_reference)
        .bind(paid_at)
        .bind(completed_at)
        .bind(&now)
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update order status: {}", e)))?
        .ok_or_else(|| Error::Conflict(format!("Order is no longer {}", expected)))?;

        debug!("Order {} moved {} -> {}", order.id, expected, next);
        Ok(order)
    }

    /// Subset of `product_ids` the buyer already owns through a completed order
    #[instrument(skip(self, product_ids))]
    pub async fn owned_products(&self, buyer_id: &str, product_ids: &[String]) -> Result<Vec<String>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT i.product_id FROM order_items i JOIN orders o ON o.id = i.order_id WHERE o.buyer_id = ",
        );
        builder.push_bind(buyer_id);
        builder.push(" AND o.status = ");
        builder.push_bind(OrderStatus::Completed.as_str());
        builder.push(" AND i.product_id IN (");
        let mut separated = builder.separated(", ");
        for id in product_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        builder
            .build_query_scalar::<String>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to check owned products: {}", e)))
    }

    /// Whether the buyer owns `product_id` through a completed order
    pub async fn has_purchased(&self, buyer_id: &str, product_id: &str) -> Result<bool> {
        Ok(!self
            .owned_products(buyer_id, &[product_id.to_string()])
            .await?
            .is_empty())
    }

    /// Seller share of completed orders; `available` counts those completed at or before `cutoff`
    #[instrument(skip(self))]
    pub async fn seller_earnings(&self, seller_id: &str, cutoff: &str) -> Result<SellerEarning> {
        sqlx::query_as::<_, SellerEarning>(
            r#"
            SELECT
                COALESCE(SUM(i.seller_amount_cents), 0) AS earned_cents,
                COALESCE(SUM(CASE WHEN o.completed_at <= ?3 THEN i.seller_amount_cents ELSE 0 END), 0) AS available_cents
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE i.seller_id = ?1 AND o.status = ?2
            "#,
        )
        .bind(seller_id)
        .bind(OrderStatus::Completed.as_str())
        .bind(cutoff)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to compute seller earnings: {}", e)))
    }
}
