//! # Store Seams
//!
//! The services reach the backing store through three traits, one per
//! table group. [`tally_db::Database`] implements all three; tests wrap it
//! to inject failures at a chosen step.
//!
//! ```text
//! ┌────────────────────┐     ┌────────────────────┐     ┌────────────────────┐
//! │    OrderStore      │     │   ShipmentStore    │     │   InventoryStore   │
//! │ detail, status,    │     │ latest, by label,  │     │ batches, ledger,   │
//! │ pickups, refunds   │     │ insert, void       │     │ product stock      │
//! └─────────┬──────────┘     └─────────┬──────────┘     └─────────┬──────────┘
//!           └──────────────────────────┼──────────────────────────┘
//!                                      ▼
//!                            tally_db::Database (SQLite)
//! ```

use async_trait::async_trait;

use tally_core::refund::RefundPlan;
use tally_core::status::{PickupCompletion, StatusChange};
use tally_core::{
    InventoryAdjustment, InventoryBatch, Order, OrderDetail, PickupReservation, ProductStock,
    Refund, Shipment, StatusHistoryEntry,
};
use tally_db::{Database, DbResult};

// =============================================================================
// Traits
// =============================================================================

/// Orders, their status trail, pickups and refunds.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order(&self, order_id: &str) -> DbResult<Option<Order>>;

    /// Order with items, history and refunds. Missing order is `NotFound`.
    async fn order_detail(&self, order_id: &str) -> DbResult<OrderDetail>;

    /// Conditional on `change.from`; appends exactly one history row.
    async fn apply_status_change(&self, change: &StatusChange) -> DbResult<StatusHistoryEntry>;

    async fn pickup_reservation(&self, reservation_id: &str)
        -> DbResult<Option<PickupReservation>>;

    async fn order_pickup(&self, order_id: &str) -> DbResult<Option<PickupReservation>>;

    /// Reservation to `picked_up` and the order change, in one unit of work.
    /// `None` when the order was already completed.
    async fn complete_pickup(
        &self,
        completion: &PickupCompletion,
    ) -> DbResult<Option<StatusHistoryEntry>>;

    /// Flips the order's stock-released flag. Returns false when it already
    /// had that value, in which case stock must not move.
    async fn set_stock_released(&self, order_id: &str, released: bool) -> DbResult<bool>;

    /// Records a processor-accepted refund and recomputes the refunded total.
    async fn record_refund(
        &self,
        order_id: &str,
        plan: &RefundPlan,
        external_id: &str,
        created_by: &str,
    ) -> DbResult<Refund>;
}

/// Shipment rows. Never deleted.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn latest_shipment(&self, order_id: &str) -> DbResult<Option<Shipment>>;

    async fn shipment_by_label(&self, label_id: &str) -> DbResult<Option<Shipment>>;

    async fn insert_shipment(&self, shipment: &Shipment) -> DbResult<()>;

    async fn mark_shipment_voided(&self, shipment_id: &str) -> DbResult<Shipment>;
}

/// Batches, the adjustment ledger and product stock.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn batch(&self, batch_id: &str) -> DbResult<Option<InventoryBatch>>;

    async fn insert_adjustment(&self, adjustment: &InventoryAdjustment) -> DbResult<()>;

    /// `MAX(0, q + delta)` on both quantities.
    async fn apply_batch_delta(&self, batch_id: &str, delta: i64) -> DbResult<InventoryBatch>;

    async fn adjustments(&self, batch_id: &str) -> DbResult<Vec<InventoryAdjustment>>;

    async fn set_product_stock(&self, product_id: &str, target: i64) -> DbResult<ProductStock>;

    async fn adjust_product_stock(&self, product_id: &str, delta: i64) -> DbResult<ProductStock>;
}

// =============================================================================
// SQLite Implementations
// =============================================================================

#[async_trait]
impl OrderStore for Database {
    async fn order(&self, order_id: &str) -> DbResult<Option<Order>> {
        self.orders().get_by_id(order_id).await
    }

    async fn order_detail(&self, order_id: &str) -> DbResult<OrderDetail> {
        self.orders().get_detail(order_id).await
    }

    async fn apply_status_change(&self, change: &StatusChange) -> DbResult<StatusHistoryEntry> {
        self.orders().apply_status_change(change).await
    }

    async fn pickup_reservation(
        &self,
        reservation_id: &str,
    ) -> DbResult<Option<PickupReservation>> {
        self.pickups().get_by_id(reservation_id).await
    }

    async fn order_pickup(&self, order_id: &str) -> DbResult<Option<PickupReservation>> {
        self.pickups().for_order(order_id).await
    }

    async fn complete_pickup(
        &self,
        completion: &PickupCompletion,
    ) -> DbResult<Option<StatusHistoryEntry>> {
        self.pickups().complete(completion).await
    }

    async fn set_stock_released(&self, order_id: &str, released: bool) -> DbResult<bool> {
        self.orders().set_stock_released(order_id, released).await
    }

    async fn record_refund(
        &self,
        order_id: &str,
        plan: &RefundPlan,
        external_id: &str,
        created_by: &str,
    ) -> DbResult<Refund> {
        self.refunds()
            .record_succeeded(order_id, plan, external_id, created_by)
            .await
    }
}

#[async_trait]
impl ShipmentStore for Database {
    async fn latest_shipment(&self, order_id: &str) -> DbResult<Option<Shipment>> {
        self.shipments().latest_for_order(order_id).await
    }

    async fn shipment_by_label(&self, label_id: &str) -> DbResult<Option<Shipment>> {
        self.shipments().get_by_label(label_id).await
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> DbResult<()> {
        self.shipments().insert(shipment).await
    }

    async fn mark_shipment_voided(&self, shipment_id: &str) -> DbResult<Shipment> {
        self.shipments().mark_voided(shipment_id).await
    }
}

#[async_trait]
impl InventoryStore for Database {
    async fn batch(&self, batch_id: &str) -> DbResult<Option<InventoryBatch>> {
        self.inventory().get_batch(batch_id).await
    }

    async fn insert_adjustment(&self, adjustment: &InventoryAdjustment) -> DbResult<()> {
        self.inventory().insert_adjustment(adjustment).await
    }

    async fn apply_batch_delta(&self, batch_id: &str, delta: i64) -> DbResult<InventoryBatch> {
        self.inventory().apply_batch_delta(batch_id, delta).await
    }

    async fn adjustments(&self, batch_id: &str) -> DbResult<Vec<InventoryAdjustment>> {
        self.inventory().adjustments_for_batch(batch_id).await
    }

    async fn set_product_stock(&self, product_id: &str, target: i64) -> DbResult<ProductStock> {
        self.inventory().set_product_stock(product_id, target).await
    }

    async fn adjust_product_stock(&self, product_id: &str, delta: i64) -> DbResult<ProductStock> {
        self.inventory().adjust_product_stock(product_id, delta).await
    }
}
