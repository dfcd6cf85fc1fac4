//! # Order Status Service
//!
//! Applies operator status changes. The rules live in
//! [`tally_core::status`]; this service reads the current status, plans the
//! change, and hands it to the store, which writes it only if the status is
//! still the one that was read.

use std::sync::Arc;
use tracing::info;

use crate::error::{OpsError, OpsResult};
use crate::store::OrderStore;
use tally_core::status::{plan_cancel, plan_pickup_completion, plan_transition, TransitionEffects};
use tally_core::{ActorId, Order, OrderStatus, StatusHistoryEntry};

/// A persisted status change and the effects it makes eligible.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransition {
    pub entry: StatusHistoryEntry,
    pub effects: TransitionEffects,
}

/// A reservation moved to `picked_up`.
#[derive(Debug, Clone, PartialEq)]
pub struct PickupCompleted {
    pub reservation_id: String,
    /// `None` when the order was already completed.
    pub transition: Option<AppliedTransition>,
}

/// Order status machine service.
#[derive(Clone)]
pub struct OrderStatusService {
    orders: Arc<dyn OrderStore>,
}

impl OrderStatusService {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        OrderStatusService { orders }
    }

    async fn current(&self, order_id: &str) -> OpsResult<Order> {
        self.orders
            .order(order_id)
            .await?
            .ok_or_else(|| OpsError::not_found("Order", order_id))
    }

    /// Moves the order to `target`.
    ///
    /// ## Errors
    /// - `OpsError::Core` - same status, or transition not offered
    /// - `OpsError::Conflict` - the status changed since it was read
    pub async fn transition(
        &self,
        order_id: &str,
        target: OrderStatus,
        note: Option<&str>,
        actor: &ActorId,
    ) -> OpsResult<AppliedTransition> {
        let order = self.current(order_id).await?;
        let change = plan_transition(order_id, order.status, target, note, actor)?;
        let entry = self.orders.apply_status_change(&change).await?;

        log_applied(&entry, &change.effects);
        Ok(AppliedTransition {
            entry,
            effects: change.effects,
        })
    }

    /// Cancels the order if cancel is offered for its status.
    pub async fn cancel(
        &self,
        order_id: &str,
        note: Option<&str>,
        actor: &ActorId,
    ) -> OpsResult<AppliedTransition> {
        let order = self.current(order_id).await?;
        let change = plan_cancel(order_id, order.status, note, actor)?;
        let entry = self.orders.apply_status_change(&change).await?;

        log_applied(&entry, &change.effects);
        Ok(AppliedTransition {
            entry,
            effects: change.effects,
        })
    }

    /// Marks the reservation picked up and completes the order together.
    ///
    /// An order that is already completed keeps its status and gains no
    /// history entry; only the reservation moves.
    pub async fn mark_picked_up(
        &self,
        order_id: &str,
        reservation_id: &str,
        actor: &ActorId,
    ) -> OpsResult<PickupCompleted> {
        let reservation = self
            .orders
            .pickup_reservation(reservation_id)
            .await?
            .ok_or_else(|| OpsError::not_found("PickupReservation", reservation_id))?;
        let order = self.current(order_id).await?;

        let completion = plan_pickup_completion(order_id, order.status, &reservation, actor)?;
        let entry = self.orders.complete_pickup(&completion).await?;

        let transition = match (entry, &completion.order_change) {
            (Some(entry), Some(change)) => {
                log_applied(&entry, &change.effects);
                Some(AppliedTransition {
                    entry,
                    effects: change.effects,
                })
            }
            _ => {
                info!(order_id = %order_id, reservation_id = %reservation_id, "Pickup recorded on completed order");
                None
            }
        };

        Ok(PickupCompleted {
            reservation_id: completion.reservation_id,
            transition,
        })
    }
}

fn log_applied(entry: &StatusHistoryEntry, effects: &TransitionEffects) {
    info!(
        order_id = %entry.order_id,
        from = ?entry.from_status,
        to = %entry.to_status,
        actor = %entry.actor_id,
        release_inventory = effects.release_inventory,
        reserve_inventory = effects.reserve_inventory,
        notify_customer = effects.notify_customer,
        "Order status changed"
    );
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::{CoreError, PaymentStatus, PickupReservation, PickupStatus};
    use tally_db::{Database, DbConfig, NewOrder};

    async fn setup(status: OrderStatus) -> (Database, OrderStatusService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.orders()
            .insert(&NewOrder {
                order: Order {
                    id: "o-1".to_string(),
                    order_number: "1001".to_string(),
                    status,
                    payment_status: PaymentStatus::Paid,
                    subtotal_cents: 2000,
                    shipping_cents: 0,
                    tax_cents: 0,
                    total_cents: 2000,
                    refunded_total_cents: 0,
                    payment_reference: Some("pi_1".to_string()),
                    customer_email: None,
                    created_at: now,
                    updated_at: now,
                },
                items: vec![],
                actor_id: "system".to_string(),
            })
            .await
            .unwrap();

        let service = OrderStatusService::new(Arc::new(db.clone()));
        (db, service)
    }

    fn actor() -> ActorId {
        ActorId::new("admin-1").unwrap()
    }

    #[tokio::test]
    async fn test_each_transition_appends_one_history_row() {
        let (db, service) = setup(OrderStatus::Processing).await;

        let applied = service
            .transition("o-1", OrderStatus::OnHold, Some("awaiting stock"), &actor())
            .await
            .unwrap();
        assert_eq!(applied.entry.from_status, Some(OrderStatus::Processing));
        assert_eq!(applied.entry.to_status, OrderStatus::OnHold);
        assert_eq!(applied.entry.note.as_deref(), Some("awaiting stock"));

        service
            .transition("o-1", OrderStatus::Completed, None, &actor())
            .await
            .unwrap();

        // Initial entry plus two transitions
        let history = db.orders().history("o-1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].to_status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_same_status_is_refused() {
        let (_, service) = setup(OrderStatus::Processing).await;
        let err = service
            .transition("o-1", OrderStatus::Processing, None, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Core(CoreError::SameStatus { .. })));
    }

    #[tokio::test]
    async fn test_cancel_rules_and_release_effect() {
        let (_, service) = setup(OrderStatus::Processing).await;
        let applied = service.cancel("o-1", None, &actor()).await.unwrap();
        assert!(applied.effects.release_inventory);
        assert!(applied.effects.notify_customer);

        let err = service.cancel("o-1", None, &actor()).await.unwrap_err();
        assert!(matches!(err, OpsError::Core(CoreError::CancelNotAllowed { .. })));

        // Not terminal: a mis-click can be corrected
        let applied = service
            .transition("o-1", OrderStatus::Processing, Some("cancelled by mistake"), &actor())
            .await
            .unwrap();
        assert!(!applied.effects.release_inventory);
        assert!(applied.effects.reserve_inventory);
    }

    #[tokio::test]
    async fn test_mark_picked_up() {
        let (db, service) = setup(OrderStatus::Processing).await;
        db.pickups()
            .insert(&PickupReservation {
                id: "r-1".to_string(),
                order_id: "o-1".to_string(),
                status: PickupStatus::Scheduled,
                scheduled_for: Utc::now(),
                picked_up_at: None,
            })
            .await
            .unwrap();

        let picked_up = service.mark_picked_up("o-1", "r-1", &actor()).await.unwrap();
        assert_eq!(picked_up.reservation_id, "r-1");
        assert_eq!(
            picked_up.transition.unwrap().entry.to_status,
            OrderStatus::Completed
        );

        let err = service.mark_picked_up("o-1", "r-1", &actor()).await.unwrap_err();
        assert!(matches!(
            err,
            OpsError::Core(CoreError::PickupNotScheduled { .. })
        ));
        assert!(matches!(
            service.mark_picked_up("o-1", "r-9", &actor()).await.unwrap_err(),
            OpsError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_pickup_on_completed_order_moves_only_the_reservation() {
        let (db, service) = setup(OrderStatus::Completed).await;
        db.pickups()
            .insert(&PickupReservation {
                id: "r-1".to_string(),
                order_id: "o-1".to_string(),
                status: PickupStatus::Scheduled,
                scheduled_for: Utc::now(),
                picked_up_at: None,
            })
            .await
            .unwrap();

        let picked_up = service.mark_picked_up("o-1", "r-1", &actor()).await.unwrap();
        assert_eq!(picked_up.transition, None);

        let reservation = db.pickups().get_by_id("r-1").await.unwrap().unwrap();
        assert_eq!(reservation.status, PickupStatus::PickedUp);
        assert!(reservation.picked_up_at.is_some());

        // Only the checkout entry
        assert_eq!(db.orders().history("o-1").await.unwrap().len(), 1);
        let order = db.orders().get_by_id("o-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_, service) = setup(OrderStatus::Processing).await;
        assert!(matches!(
            service
                .transition("ghost", OrderStatus::OnHold, None, &actor())
                .await
                .unwrap_err(),
            OpsError::NotFound { .. }
        ));
    }
}
