//! # Order Repository
//!
//! Orders, their line items and the append-only status trail.
//!
//! ## Status Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE orders SET status = :to                                       │
//! │     WHERE id = :id AND status = :from      ← conditional write         │
//! │    rows_affected == 0 ?                                                 │
//! │      ├── order missing   → DbError::NotFound                            │
//! │      └── status moved on → DbError::Conflict                            │
//! │    INSERT INTO order_status_history (from, to, note, actor)             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::refund::RefundRepository;
use tally_core::status::StatusChange;
use tally_core::{Order, OrderDetail, OrderItem, OrderStatus, StatusHistoryEntry};

const ORDER_COLUMNS: &str = r#"
    id, order_number, status, payment_status,
    subtotal_cents, shipping_cents, tax_cents, total_cents, refunded_total_cents,
    payment_reference, customer_email, created_at, updated_at
"#;

/// An order as written at checkout, with its items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Recorded on the initial history entry.
    pub actor_id: String,
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order header by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = ?1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets the line items of an order in insertion order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, name, unit_price_cents, quantity, line_total_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets the status trail, oldest first.
    pub async fn history(&self, order_id: &str) -> DbResult<Vec<StatusHistoryEntry>> {
        let history = sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            SELECT id, order_id, from_status, to_status, note, actor_id, created_at
            FROM order_status_history
            WHERE order_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(history)
    }

    /// Loads an order with its items, history and refunds.
    ///
    /// ## Errors
    /// `DbError::NotFound` when the order does not exist.
    pub async fn get_detail(&self, id: &str) -> DbResult<OrderDetail> {
        debug!(order_id = %id, "Loading order detail");

        let order = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;
        let items = self.items(id).await?;
        let history = self.history(id).await?;
        let refunds = RefundRepository::new(self.pool.clone()).for_order(id).await?;

        Ok(OrderDetail {
            order,
            items,
            history,
            refunds,
        })
    }

    /// Inserts an order, its items and the initial history entry.
    pub async fn insert(&self, new: &NewOrder) -> DbResult<()> {
        let order = &new.order;
        debug!(order_id = %order.id, order_number = %order.order_number, "Inserting order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, status, payment_status,
                subtotal_cents, shipping_cents, tax_cents, total_cents, refunded_total_cents,
                payment_reference, customer_email, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.refunded_total_cents)
        .bind(&order.payment_reference)
        .bind(&order.customer_email)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, name, unit_price_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&order.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        insert_history(
            &mut tx,
            &order.id,
            None,
            order.status,
            None,
            &new.actor_id,
            order.created_at,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Applies a validated status change.
    ///
    /// The order update is conditional on `change.from`, and exactly one
    /// history row is written with it.
    pub async fn apply_status_change(&self, change: &StatusChange) -> DbResult<StatusHistoryEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = write_status_change(&mut tx, change).await?;
        tx.commit().await?;

        info!(
            order_id = %change.order_id,
            from = %change.from,
            to = %change.to,
            actor = %change.actor_id,
            "Order status changed"
        );
        Ok(entry)
    }

    /// Sets the stock-released flag if it differs from `released`.
    ///
    /// Returns true when this call flipped it. Only the caller that flips
    /// the flag may move stock.
    pub async fn set_stock_released(&self, order_id: &str, released: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET stock_released = ?2 WHERE id = ?1 AND stock_released <> ?2",
        )
        .bind(order_id)
        .bind(released)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(order_id = %order_id, released, "Stock release flag flipped");
            return Ok(true);
        }

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Order", order_id)),
        }
    }

    /// Counts orders (used by the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Conditional status update plus history insert on an open transaction.
pub(crate) async fn write_status_change(
    conn: &mut SqliteConnection,
    change: &StatusChange,
) -> DbResult<StatusHistoryEntry> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET status = ?3, updated_at = ?4
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(&change.order_id)
    .bind(change.from)
    .bind(change.to)
    .bind(change.at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let actual: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = ?1")
                .bind(&change.order_id)
                .fetch_optional(&mut *conn)
                .await?;

        return Err(match actual {
            None => DbError::not_found("Order", &change.order_id),
            Some(actual) => DbError::conflict(
                "Order",
                &change.order_id,
                format!("expected status {}, found {}", change.from, actual),
            ),
        });
    }

    insert_history(
        conn,
        &change.order_id,
        Some(change.from),
        change.to,
        change.note.as_deref(),
        &change.actor_id,
        change.at,
    )
    .await
}

async fn insert_history(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: Option<OrderStatus>,
    to: OrderStatus,
    note: Option<&str>,
    actor_id: &str,
    at: chrono::DateTime<Utc>,
) -> DbResult<StatusHistoryEntry> {
    let entry = StatusHistoryEntry {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        from_status: from,
        to_status: to,
        note: note.map(str::to_string),
        actor_id: actor_id.to_string(),
        created_at: at,
    };

    sqlx::query(
        r#"
        INSERT INTO order_status_history (
            id, order_id, from_status, to_status, note, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.order_id)
    .bind(entry.from_status)
    .bind(entry.to_status)
    .bind(&entry.note)
    .bind(&entry.actor_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, sample_order, seeded};
    use tally_core::status::plan_transition;
    use tally_core::ActorId;

    fn actor() -> ActorId {
        ActorId::new("admin-1").unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_load_detail() {
        let db = seeded("o-1").await;

        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.total_cents, 10000);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[0].id, "o-1-a");
        assert_eq!(detail.history.len(), 1);
        assert_eq!(detail.history[0].from_status, None);
        assert_eq!(detail.history[0].to_status, OrderStatus::Processing);
        assert!(detail.refunds.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let db = db().await;
        assert!(db.orders().get_by_id("nope").await.unwrap().is_none());
        assert!(db.orders().get_detail("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_status_change_appends_one_history_row() {
        let db = seeded("o-1").await;
        let change = plan_transition(
            "o-1",
            OrderStatus::Processing,
            OrderStatus::OnHold,
            Some("address check"),
            &actor(),
        )
        .unwrap();

        let entry = db.orders().apply_status_change(&change).await.unwrap();
        assert_eq!(entry.from_status, Some(OrderStatus::Processing));

        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::OnHold);
        assert_eq!(detail.history.len(), 2);
        assert_eq!(detail.history[1].note.as_deref(), Some("address check"));
        assert_eq!(detail.history[1].actor_id, "admin-1");
    }

    #[tokio::test]
    async fn test_stale_status_change_conflicts() {
        let db = seeded("o-1").await;
        let first =
            plan_transition("o-1", OrderStatus::Processing, OrderStatus::OnHold, None, &actor())
                .unwrap();
        let stale =
            plan_transition("o-1", OrderStatus::Processing, OrderStatus::Completed, None, &actor())
                .unwrap();

        db.orders().apply_status_change(&first).await.unwrap();
        let err = db.orders().apply_status_change(&stale).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        // The losing write left no history behind
        assert_eq!(db.orders().history("o-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_for_missing_order() {
        let db = db().await;
        let change =
            plan_transition("ghost", OrderStatus::Processing, OrderStatus::OnHold, None, &actor())
                .unwrap();
        assert!(db
            .orders()
            .apply_status_change(&change)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let db = seeded("o-1").await;
        let mut dup = sample_order("o-2");
        dup.order.order_number = "#o-1".to_string();
        let err = db.orders().insert(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(db.orders().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stock_released_flag_flips_once() {
        let db = seeded("o-1").await;
        let orders = db.orders();

        assert!(!orders.set_stock_released("o-1", false).await.unwrap());
        assert!(orders.set_stock_released("o-1", true).await.unwrap());
        assert!(!orders.set_stock_released("o-1", true).await.unwrap());
        assert!(orders.set_stock_released("o-1", false).await.unwrap());
        assert!(orders.set_stock_released("ghost", true).await.unwrap_err().is_not_found());
    }
}
