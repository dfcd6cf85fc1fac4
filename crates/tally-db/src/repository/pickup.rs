//! # Pickup Repository
//!
//! Reservations for the in-store pickup variant of fulfillment.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::order::write_status_change;
use tally_core::status::PickupCompletion;
use tally_core::{OrderStatus, PickupReservation, StatusHistoryEntry};

const RESERVATION_COLUMNS: &str = "id, order_id, status, scheduled_for, picked_up_at";

/// Repository for pickup reservation operations.
#[derive(Debug, Clone)]
pub struct PickupRepository {
    pool: SqlitePool,
}

impl PickupRepository {
    /// Creates a new PickupRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PickupRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PickupReservation>> {
        let reservation = sqlx::query_as::<_, PickupReservation>(&format!(
            "SELECT {} FROM pickup_reservations WHERE id = ?1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    /// Gets the most recent reservation of an order.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Option<PickupReservation>> {
        let reservation = sqlx::query_as::<_, PickupReservation>(&format!(
            r#"
            SELECT {}
            FROM pickup_reservations
            WHERE order_id = ?1
            ORDER BY scheduled_for DESC, rowid DESC
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    pub async fn insert(&self, reservation: &PickupReservation) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pickup_reservations (id, order_id, status, scheduled_for, picked_up_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.order_id)
        .bind(reservation.status)
        .bind(reservation.scheduled_for)
        .bind(reservation.picked_up_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks the reservation picked up and applies the order's status
    /// change, if any, in one transaction.
    ///
    /// Returns the history entry written, or `None` when the order was
    /// already completed.
    ///
    /// ## Errors
    /// - `DbError::Conflict` - reservation no longer scheduled, or order
    ///   status moved on
    /// - `DbError::NotFound` - reservation or order missing
    pub async fn complete(
        &self,
        completion: &PickupCompletion,
    ) -> DbResult<Option<StatusHistoryEntry>> {
        let reservation_id = completion.reservation_id.as_str();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE pickup_reservations SET status = 'picked_up', picked_up_at = ?2
            WHERE id = ?1 AND status = 'scheduled'
            "#,
        )
        .bind(reservation_id)
        .bind(completion.at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT id FROM pickup_reservations WHERE id = ?1")
                    .bind(reservation_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => DbError::conflict("PickupReservation", reservation_id, "not scheduled"),
                None => DbError::not_found("PickupReservation", reservation_id),
            });
        }

        let entry = match &completion.order_change {
            Some(change) => Some(write_status_change(&mut tx, change).await?),
            None => {
                let actual: Option<OrderStatus> =
                    sqlx::query_scalar("SELECT status FROM orders WHERE id = ?1")
                        .bind(&completion.order_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                match actual {
                    Some(OrderStatus::Completed) => None,
                    Some(actual) => {
                        return Err(DbError::conflict(
                            "Order",
                            &completion.order_id,
                            format!("expected status completed, found {}", actual),
                        ))
                    }
                    None => return Err(DbError::not_found("Order", &completion.order_id)),
                }
            }
        };
        tx.commit().await?;

        info!(
            order_id = %completion.order_id,
            reservation_id = %reservation_id,
            status_changed = entry.is_some(),
            "Order picked up"
        );
        Ok(entry)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::seeded;
    use chrono::Utc;
    use tally_core::status::plan_pickup_completion;
    use tally_core::{ActorId, OrderStatus, PickupStatus};

    fn reservation() -> PickupReservation {
        PickupReservation {
            id: "r-1".to_string(),
            order_id: "o-1".to_string(),
            status: PickupStatus::Scheduled,
            scheduled_for: Utc::now(),
            picked_up_at: None,
        }
    }

    #[tokio::test]
    async fn test_complete_updates_both_rows() {
        let db = seeded("o-1").await;
        db.pickups().insert(&reservation()).await.unwrap();

        let actor = ActorId::new("clerk-1").unwrap();
        let completion =
            plan_pickup_completion("o-1", OrderStatus::Processing, &reservation(), &actor).unwrap();
        let entry = db.pickups().complete(&completion).await.unwrap().unwrap();
        assert_eq!(entry.to_status, OrderStatus::Completed);

        let stored = db.pickups().for_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PickupStatus::PickedUp);
        assert!(stored.picked_up_at.is_some());
        let order = db.orders().get_by_id("o-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_stale_order_status_rolls_back_reservation() {
        let db = seeded("o-1").await;
        db.pickups().insert(&reservation()).await.unwrap();

        let actor = ActorId::new("clerk-1").unwrap();
        // Planned as if the order were on hold; it is processing
        let completion =
            plan_pickup_completion("o-1", OrderStatus::OnHold, &reservation(), &actor).unwrap();
        let err = db.pickups().complete(&completion).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let stored = db.pickups().get_by_id("r-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PickupStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_completed_order_keeps_history_untouched() {
        let db = seeded("o-1").await;
        db.pickups().insert(&reservation()).await.unwrap();
        let actor = ActorId::new("clerk-1").unwrap();
        let shipped = tally_core::status::plan_transition(
            "o-1",
            OrderStatus::Processing,
            OrderStatus::Completed,
            None,
            &actor,
        )
        .unwrap();
        db.orders().apply_status_change(&shipped).await.unwrap();
        let history_before = db.orders().get_detail("o-1").await.unwrap().history.len();

        let completion =
            plan_pickup_completion("o-1", OrderStatus::Completed, &reservation(), &actor).unwrap();
        assert_eq!(db.pickups().complete(&completion).await.unwrap(), None);

        let stored = db.pickups().get_by_id("r-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PickupStatus::PickedUp);
        let detail = db.orders().get_detail("o-1").await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::Completed);
        assert_eq!(detail.history.len(), history_before);
    }

    #[tokio::test]
    async fn test_reopened_order_rejects_statusless_completion() {
        let db = seeded("o-1").await;
        db.pickups().insert(&reservation()).await.unwrap();
        let actor = ActorId::new("clerk-1").unwrap();

        // Planned while the order read completed; it is processing
        let completion =
            plan_pickup_completion("o-1", OrderStatus::Completed, &reservation(), &actor).unwrap();
        let err = db.pickups().complete(&completion).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let stored = db.pickups().get_by_id("r-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PickupStatus::Scheduled);
    }
}
