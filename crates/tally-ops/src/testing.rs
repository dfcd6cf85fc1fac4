//! # In-Memory Collaborators
//!
//! Fakes for the carrier and the payment processor, and a store wrapper
//! that fails chosen steps. Used by the unit tests, the scenario tests and
//! for running the services without live external accounts.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

use crate::carrier::{CarrierClient, PurchasedLabel, VoidDecision};
use crate::error::{OpsError, OpsResult};
use crate::payments::{PaymentProcessor, ProcessorRefund, RefundSubmission};
use crate::store::{InventoryStore, OrderStore, ShipmentStore};
use tally_core::refund::RefundPlan;
use tally_core::status::{PickupCompletion, StatusChange};
use tally_core::{
    InventoryAdjustment, InventoryBatch, Order, OrderDetail, PickupReservation, ProductStock,
    Refund, Shipment, StatusHistoryEntry, TrackingEvent,
};
use tally_db::{Database, DbError, DbResult};

// =============================================================================
// Fake Carrier
// =============================================================================

#[derive(Debug, Default)]
struct CarrierState {
    purchased: Vec<String>,
    voided: Vec<String>,
    next_error: Option<OpsError>,
    deny_voids: Option<String>,
    tracking: Vec<TrackingEvent>,
    fail_tracking: bool,
}

/// Carrier that sells $8.95 ground labels numbered `lbl_1`, `lbl_2`, ...
#[derive(Debug, Default)]
pub struct FakeCarrier {
    state: Mutex<CarrierState>,
}

impl FakeCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next create or void call fails with `err`.
    pub async fn fail_next(&self, err: OpsError) {
        self.state.lock().await.next_error = Some(err);
    }

    /// Voids are answered `approved: false` with `message`.
    pub async fn deny_voids(&self, message: impl Into<String>) {
        self.state.lock().await.deny_voids = Some(message.into());
    }

    pub async fn set_tracking(&self, events: Vec<TrackingEvent>) {
        self.state.lock().await.tracking = events;
    }

    /// Tracking lookups fail with a transport error.
    pub async fn fail_tracking(&self) {
        self.state.lock().await.fail_tracking = true;
    }

    /// Label ids sold so far.
    pub async fn purchased(&self) -> Vec<String> {
        self.state.lock().await.purchased.clone()
    }

    /// Label ids voided so far.
    pub async fn voided(&self) -> Vec<String> {
        self.state.lock().await.voided.clone()
    }
}

#[async_trait]
impl CarrierClient for FakeCarrier {
    async fn create_label(&self, order_id: &str) -> OpsResult<PurchasedLabel> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }

        let label_id = format!("lbl_{}", state.purchased.len() + 1);
        state.purchased.push(label_id.clone());

        Ok(PurchasedLabel {
            tracking_number: Some(format!("1Z{}", order_id)),
            label_url: Some(format!("https://labels.example.com/{}.pdf", label_id)),
            label_id,
            cost_cents: 895,
            carrier_code: "ups".to_string(),
            service_code: "ground".to_string(),
        })
    }

    async fn void_label(&self, label_id: &str) -> OpsResult<VoidDecision> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }
        if let Some(message) = &state.deny_voids {
            return Ok(VoidDecision {
                approved: false,
                message: message.clone(),
            });
        }

        state.voided.push(label_id.to_string());
        Ok(VoidDecision {
            approved: true,
            message: "Label voided".to_string(),
        })
    }

    async fn tracking_events(&self, _label_id: &str) -> OpsResult<Vec<TrackingEvent>> {
        let state = self.state.lock().await;
        if state.fail_tracking {
            return Err(OpsError::transport("carrier", "tracking lookup timed out"));
        }
        Ok(state.tracking.clone())
    }
}

// =============================================================================
// Fake Payments
// =============================================================================

#[derive(Debug, Default)]
struct PaymentState {
    submissions: Vec<RefundSubmission>,
    next_error: Option<OpsError>,
}

/// Processor that accepts every refund as `re_1`, `re_2`, ...
#[derive(Debug, Default)]
pub struct FakePayments {
    state: Mutex<PaymentState>,
}

impl FakePayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next submission fails with `err`.
    pub async fn fail_next(&self, err: OpsError) {
        self.state.lock().await.next_error = Some(err);
    }

    /// Every submission received, accepted or not.
    pub async fn submissions(&self) -> Vec<RefundSubmission> {
        self.state.lock().await.submissions.clone()
    }
}

#[async_trait]
impl PaymentProcessor for FakePayments {
    async fn submit_refund(&self, submission: &RefundSubmission) -> OpsResult<ProcessorRefund> {
        let mut state = self.state.lock().await;
        state.submissions.push(submission.clone());
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }

        Ok(ProcessorRefund {
            refund_id: format!("re_{}", state.submissions.len()),
            status: "succeeded".to_string(),
        })
    }
}

// =============================================================================
// Failing Store
// =============================================================================

/// A store step that [`FailingStore`] can break.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreStep {
    LatestShipment,
    InsertShipment,
    MarkVoided,
    InsertAdjustment,
    BatchDelta,
    RecordRefund,
    OrderPickup,
    StockReleasedFlag,
    /// Stock writes for one product id.
    ProductStock(String),
}

/// [`Database`] wrapper that fails the configured steps with a query error.
#[derive(Debug)]
pub struct FailingStore {
    inner: Database,
    failing: Mutex<HashSet<StoreStep>>,
}

impl FailingStore {
    pub fn new(inner: Database) -> Self {
        FailingStore {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// The wrapped database, for direct setup and assertions.
    pub fn inner(&self) -> &Database {
        &self.inner
    }

    pub async fn fail(&self, step: StoreStep) {
        self.failing.lock().await.insert(step);
    }

    pub async fn heal(&self, step: &StoreStep) {
        self.failing.lock().await.remove(step);
    }

    async fn check(&self, step: StoreStep) -> DbResult<()> {
        if self.failing.lock().await.contains(&step) {
            return Err(DbError::QueryFailed(format!("injected failure at {:?}", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for FailingStore {
    async fn order(&self, order_id: &str) -> DbResult<Option<Order>> {
        OrderStore::order(&self.inner, order_id).await
    }

    async fn order_detail(&self, order_id: &str) -> DbResult<OrderDetail> {
        self.inner.order_detail(order_id).await
    }

    async fn apply_status_change(&self, change: &StatusChange) -> DbResult<StatusHistoryEntry> {
        self.inner.apply_status_change(change).await
    }

    async fn pickup_reservation(
        &self,
        reservation_id: &str,
    ) -> DbResult<Option<PickupReservation>> {
        self.inner.pickup_reservation(reservation_id).await
    }

    async fn order_pickup(&self, order_id: &str) -> DbResult<Option<PickupReservation>> {
        self.check(StoreStep::OrderPickup).await?;
        self.inner.order_pickup(order_id).await
    }

    async fn complete_pickup(
        &self,
        completion: &PickupCompletion,
    ) -> DbResult<Option<StatusHistoryEntry>> {
        self.inner.complete_pickup(completion).await
    }

    async fn set_stock_released(&self, order_id: &str, released: bool) -> DbResult<bool> {
        self.check(StoreStep::StockReleasedFlag).await?;
        self.inner.set_stock_released(order_id, released).await
    }

    async fn record_refund(
        &self,
        order_id: &str,
        plan: &RefundPlan,
        external_id: &str,
        created_by: &str,
    ) -> DbResult<Refund> {
        self.check(StoreStep::RecordRefund).await?;
        self.inner
            .record_refund(order_id, plan, external_id, created_by)
            .await
    }
}

#[async_trait]
impl ShipmentStore for FailingStore {
    async fn latest_shipment(&self, order_id: &str) -> DbResult<Option<Shipment>> {
        self.check(StoreStep::LatestShipment).await?;
        self.inner.latest_shipment(order_id).await
    }

    async fn shipment_by_label(&self, label_id: &str) -> DbResult<Option<Shipment>> {
        self.inner.shipment_by_label(label_id).await
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> DbResult<()> {
        self.check(StoreStep::InsertShipment).await?;
        self.inner.insert_shipment(shipment).await
    }

    async fn mark_shipment_voided(&self, shipment_id: &str) -> DbResult<Shipment> {
        self.check(StoreStep::MarkVoided).await?;
        self.inner.mark_shipment_voided(shipment_id).await
    }
}

#[async_trait]
impl InventoryStore for FailingStore {
    async fn batch(&self, batch_id: &str) -> DbResult<Option<InventoryBatch>> {
        self.inner.batch(batch_id).await
    }

    async fn insert_adjustment(&self, adjustment: &InventoryAdjustment) -> DbResult<()> {
        self.check(StoreStep::InsertAdjustment).await?;
        self.inner.insert_adjustment(adjustment).await
    }

    async fn apply_batch_delta(&self, batch_id: &str, delta: i64) -> DbResult<InventoryBatch> {
        self.check(StoreStep::BatchDelta).await?;
        self.inner.apply_batch_delta(batch_id, delta).await
    }

    async fn adjustments(&self, batch_id: &str) -> DbResult<Vec<InventoryAdjustment>> {
        self.inner.adjustments(batch_id).await
    }

    async fn set_product_stock(&self, product_id: &str, target: i64) -> DbResult<ProductStock> {
        self.check(StoreStep::ProductStock(product_id.to_string()))
            .await?;
        self.inner.set_product_stock(product_id, target).await
    }

    async fn adjust_product_stock(&self, product_id: &str, delta: i64) -> DbResult<ProductStock> {
        self.check(StoreStep::ProductStock(product_id.to_string()))
            .await?;
        self.inner.adjust_product_stock(product_id, delta).await
    }
}
