//! # Refund Repository
//!
//! Refund rows, their line items, and the order's refunded total.
//!
//! ## Recording a Succeeded Refund
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT refunds (status = succeeded, external_id)                     │
//! │    INSERT refund_items ...                                              │
//! │    per item: SUM(refund_items.quantity) > ordered ? → ROLLBACK          │
//! │    refunded = SUM(amount_cents) WHERE status = 'succeeded'              │
//! │    refunded > total_cents ?  → ROLLBACK, DbError::Conflict              │
//! │    UPDATE orders SET refunded_total_cents, payment_status               │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The total is recomputed from rows, never incremented, so
//! `Σ succeeded refunds == refunded_total_cents` holds after every commit.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::refund::RefundPlan;
use tally_core::{Money, PaymentStatus, Refund, RefundItem, RefundStatus};

/// Repository for refund database operations.
#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    /// Creates a new RefundRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    /// Lists refunds of an order, oldest first, with their items attached.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<Refund>> {
        let mut refunds = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, order_id, amount_cents, reason, status, external_id, created_by, created_at
            FROM refunds
            WHERE order_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, RefundItem>(
            r#"
            SELECT ri.id, ri.refund_id, ri.order_item_id, ri.quantity, ri.amount_cents, ri.description
            FROM refund_items ri
            JOIN refunds r ON r.id = ri.refund_id
            WHERE r.order_id = ?1
            ORDER BY ri.rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_refund: HashMap<String, Vec<RefundItem>> = HashMap::new();
        for item in items {
            by_refund.entry(item.refund_id.clone()).or_default().push(item);
        }
        for refund in &mut refunds {
            refund.items = by_refund.remove(&refund.id).unwrap_or_default();
        }

        Ok(refunds)
    }

    /// Sum of succeeded refunds recomputed from the refund rows.
    pub async fn succeeded_total(&self, order_id: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM refunds
            WHERE order_id = ?1 AND status = 'succeeded'
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// Records a refund the payment processor already accepted.
    ///
    /// ## Errors
    /// - `DbError::NotFound` - the order does not exist
    /// - `DbError::Conflict` - the new refunded total would exceed the
    ///   order total, or an item would be refunded more times than it was
    ///   ordered (nothing is written)
    pub async fn record_succeeded(
        &self,
        order_id: &str,
        plan: &RefundPlan,
        external_id: &str,
        created_by: &str,
    ) -> DbResult<Refund> {
        debug!(order_id = %order_id, amount = plan.amount_cents, external_id = %external_id, "Recording refund");

        let now = Utc::now();
        let refund_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let order: Option<(i64, PaymentStatus)> =
            sqlx::query_as("SELECT total_cents, payment_status FROM orders WHERE id = ?1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (total_cents, payment_status) =
            order.ok_or_else(|| DbError::not_found("Order", order_id))?;

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, order_id, amount_cents, reason, status, external_id, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&refund_id)
        .bind(order_id)
        .bind(plan.amount_cents)
        .bind(&plan.reason)
        .bind(RefundStatus::Succeeded)
        .bind(external_id)
        .bind(created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(plan.items.len());
        for planned in &plan.items {
            let item = RefundItem {
                id: Uuid::new_v4().to_string(),
                refund_id: refund_id.clone(),
                order_item_id: planned.order_item_id.clone(),
                quantity: planned.quantity,
                amount_cents: planned.amount_cents,
                description: Some(planned.description.clone()),
            };

            sqlx::query(
                r#"
                INSERT INTO refund_items (
                    id, refund_id, order_item_id, quantity, amount_cents, description
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&item.refund_id)
            .bind(&item.order_item_id)
            .bind(item.quantity)
            .bind(item.amount_cents)
            .bind(&item.description)
            .execute(&mut *tx)
            .await?;

            items.push(item);
        }

        let mut checked: Vec<&str> = Vec::with_capacity(plan.items.len());
        for planned in &plan.items {
            let order_item_id = planned.order_item_id.as_str();
            if checked.contains(&order_item_id) {
                continue;
            }
            checked.push(order_item_id);

            let quantities: Option<(i64, i64)> = sqlx::query_as(
                r#"
                SELECT oi.quantity, COALESCE((
                    SELECT SUM(ri.quantity)
                    FROM refund_items ri
                    JOIN refunds r ON r.id = ri.refund_id
                    WHERE ri.order_item_id = oi.id AND r.status = 'succeeded'
                ), 0)
                FROM order_items oi
                WHERE oi.id = ?1 AND oi.order_id = ?2
                "#,
            )
            .bind(order_item_id)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

            let reason = match quantities {
                None => Some("item does not belong to the order".to_string()),
                Some((ordered, refunded)) if refunded > ordered => Some(format!(
                    "{} of {} units would be refunded",
                    refunded, ordered
                )),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(DbError::conflict("Order item", order_item_id, reason));
            }
        }

        let refunded_cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM refunds
            WHERE order_id = ?1 AND status = 'succeeded'
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        if refunded_cents > total_cents {
            // Dropping the transaction rolls back the inserts
            return Err(DbError::conflict(
                "Order",
                order_id,
                format!(
                    "refunded total {} would exceed order total {}",
                    Money::from_cents(refunded_cents),
                    Money::from_cents(total_cents)
                ),
            ));
        }

        let new_payment_status = payment_status.after_refund(
            Money::from_cents(refunded_cents),
            Money::from_cents(total_cents),
        );

        sqlx::query(
            r#"
            UPDATE orders SET
                refunded_total_cents = ?2,
                payment_status = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(refunded_cents)
        .bind(new_payment_status)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            order_id = %order_id,
            refund_id = %refund_id,
            amount = plan.amount_cents,
            refunded_total = refunded_cents,
            "Refund recorded"
        );

        Ok(Refund {
            id: refund_id,
            order_id: order_id.to_string(),
            amount_cents: plan.amount_cents,
            reason: plan.reason.clone(),
            status: RefundStatus::Succeeded,
            external_id: Some(external_id.to_string()),
            created_by: created_by.to_string(),
            created_at: now,
            items,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::seeded;
    use tally_core::refund::{plan_refund, RefundSelection};

    #[tokio::test]
    async fn test_record_recomputes_total_and_payment_status() {
        let db = seeded("o-1").await;
        let detail = db.orders().get_detail("o-1").await.unwrap();
        let plan = plan_refund(&detail, &RefundSelection::items([("o-1-a", 2)])).unwrap();

        let refund = db
            .refunds()
            .record_succeeded("o-1", &plan, "re_1", "admin-1")
            .await
            .unwrap();
        assert_eq!(refund.amount_cents, 4000);
        assert_eq!(refund.items.len(), 1);

        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.refunded_total_cents, 4000);
        assert_eq!(detail.order.payment_status, PaymentStatus::PartiallyRefunded);
        assert_eq!(detail.order.remaining_refundable().cents(), 6000);
        assert_eq!(detail.refunds.len(), 1);
        assert_eq!(detail.refunds[0].items[0].quantity, 2);
        assert_eq!(detail.remaining_quantity("o-1-a"), 1);
        assert_eq!(
            db.refunds().succeeded_total("o-1").await.unwrap(),
            detail.succeeded_refund_total()
        );
    }

    #[tokio::test]
    async fn test_full_refund_marks_order_refunded() {
        let db = seeded("o-1").await;
        let detail = db.orders().get_detail("o-1").await.unwrap();
        let plan = plan_refund(&detail, &RefundSelection::full_order()).unwrap();

        db.refunds()
            .record_succeeded("o-1", &plan, "re_full", "admin-1")
            .await
            .unwrap();

        let order = db.orders().get_by_id("o-1").await.unwrap().unwrap();
        assert_eq!(order.refunded_total_cents, 10000);
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_exceeding_total_rolls_back() {
        let db = seeded("o-1").await;
        let detail = db.orders().get_detail("o-1").await.unwrap();
        let plan = plan_refund(&detail, &RefundSelection::manual("60")).unwrap();

        db.refunds()
            .record_succeeded("o-1", &plan, "re_1", "admin-1")
            .await
            .unwrap();
        // Planned against the stale detail: 60 + 60 > 100
        let err = db
            .refunds()
            .record_succeeded("o-1", &plan, "re_2", "admin-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.refunded_total_cents, 6000);
        assert_eq!(detail.refunds.len(), 1);
    }

    #[tokio::test]
    async fn test_item_quantity_bounded_across_stale_plans() {
        let db = seeded("o-1").await;
        let detail = db.orders().get_detail("o-1").await.unwrap();
        // Both planned against the same detail: 2 + 2 of 3 units, $80 of $100
        let first = plan_refund(&detail, &RefundSelection::items([("o-1-a", 2)])).unwrap();
        let second = first.clone();

        db.refunds()
            .record_succeeded("o-1", &first, "re_1", "admin-1")
            .await
            .unwrap();
        let err = db
            .refunds()
            .record_succeeded("o-1", &second, "re_2", "admin-1")
            .await
            .unwrap_err();
        match err {
            DbError::Conflict { entity, id, .. } => {
                assert_eq!(entity, "Order item");
                assert_eq!(id, "o-1-a");
            }
            other => panic!("expected Conflict, got {:?}", other),
        }

        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.refunded_total_cents, 4000);
        assert_eq!(detail.refunds.len(), 1);
        assert_eq!(detail.remaining_quantity("o-1-a"), 1);

        // The last unit is still refundable
        let last = plan_refund(&detail, &RefundSelection::items([("o-1-a", 1)])).unwrap();
        db.refunds()
            .record_succeeded("o-1", &last, "re_3", "admin-1")
            .await
            .unwrap();
        assert_eq!(db.refunds().succeeded_total("o-1").await.unwrap().cents(), 6000);
    }

    #[tokio::test]
    async fn test_missing_order() {
        let db = seeded("o-1").await;
        let detail = db.orders().get_detail("o-1").await.unwrap();
        let plan = plan_refund(&detail, &RefundSelection::manual("1")).unwrap();

        let err = db
            .refunds()
            .record_succeeded("ghost", &plan, "re_1", "admin-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
