//! # Order Detail Orchestrator
//!
//! Everything the order detail screen needs: one composed read, and one
//! entry point for every action its panels can trigger.
//!
//! ## Load
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order detail (items, history, refunds)   required  → error on failure │
//! │  active shipment                          optional  → warning          │
//! │  tracking events (unvoided label only)    optional  → warning          │
//! │  pickup reservation                       optional  → warning          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ActionGuards computed from what was read                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dispatch
//! Runs one action, turns a failure into a [`PanelError`] for the panel
//! that triggered it, then reloads the view from the store. Server-computed
//! fields such as `refunded_total_cents` are never patched locally.
//!
//! ```text
//! cancelled / failed from a stock-holding status
//!     set_stock_released(true)  flipped? → release_order_stock
//! back to pending_payment / processing / on_hold
//!     set_stock_released(false) flipped? → reserve_order_stock
//! ```
//!
//! The flag makes each direction happen at most once per cycle, however
//! often an operator cancels and reopens.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::carrier::{CarrierClient, HttpCarrierClient};
use crate::config::OpsConfig;
use crate::error::{OpsResult, PanelError};
use crate::labels::{ShipmentLabelManager, VoidOutcome};
use crate::ledger::InventoryLedger;
use crate::payments::{HttpPaymentProcessor, PaymentProcessor};
use crate::refunds::RefundService;
use crate::status::{AppliedTransition, OrderStatusService, PickupCompleted};
use crate::store::OrderStore;
use tally_core::inventory::BulkSaveReport;
use tally_core::refund::{can_refund, RefundSelection};
use tally_core::shipment::{can_create_label, can_void_label};
use tally_core::status::{available_transitions, can_cancel, can_mark_picked_up};
use tally_core::{
    ActorId, OrderDetail, OrderStatus, PickupReservation, Refund, Shipment, TrackingEvent,
};
use tally_db::Database;

// =============================================================================
// View
// =============================================================================

/// Which actions the screen offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionGuards {
    pub can_create_label: bool,
    pub can_void_label: bool,
    pub can_refund: bool,
    pub can_cancel: bool,
    pub available_transitions: Vec<OrderStatus>,
    pub can_mark_picked_up: bool,
}

/// The composed order detail screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub detail: OrderDetail,
    pub shipment: Option<Shipment>,
    pub tracking: Vec<TrackingEvent>,
    pub pickup: Option<PickupReservation>,
    pub guards: ActionGuards,
    /// Optional reads that failed; the rest of the view is still valid.
    pub warnings: Vec<String>,
}

// =============================================================================
// Actions
// =============================================================================

/// An operator action on one order.
#[derive(Debug, Clone)]
pub enum OrderAction {
    Transition {
        target: OrderStatus,
        note: Option<String>,
    },
    Cancel {
        note: Option<String>,
    },
    MarkPickedUp {
        reservation_id: String,
    },
    CreateLabel,
    VoidLabel {
        label_id: String,
    },
    Refund(RefundSelection),
}

/// The screen panel an action belongs to; errors render there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Status,
    Pickup,
    Shipping,
    Refund,
}

impl OrderAction {
    pub fn panel(&self) -> Panel {
        match self {
            OrderAction::Transition { .. } | OrderAction::Cancel { .. } => Panel::Status,
            OrderAction::MarkPickedUp { .. } => Panel::Pickup,
            OrderAction::CreateLabel | OrderAction::VoidLabel { .. } => Panel::Shipping,
            OrderAction::Refund(_) => Panel::Refund,
        }
    }
}

/// What a successful action did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    StatusChanged(AppliedTransition),
    PickedUp(PickupCompleted),
    LabelCreated(Shipment),
    LabelVoided(Shipment),
    /// The carrier answered but refused the void.
    VoidNotApproved { message: String },
    Refunded(Refund),
}

/// Result of [`OrderDetailOrchestrator::dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub panel: Panel,
    pub outcome: Result<ActionOutcome, PanelError>,
    /// Stock release triggered by the transition, if any.
    pub released: Option<BulkSaveReport>,
    /// Stock taken back by reopening a released order, if any.
    pub reserved: Option<BulkSaveReport>,
    /// The view re-read after the action.
    pub view: OrderView,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Order detail screen service.
#[derive(Clone)]
pub struct OrderDetailOrchestrator {
    orders: Arc<dyn OrderStore>,
    status: OrderStatusService,
    refunds: RefundService,
    labels: ShipmentLabelManager,
    ledger: InventoryLedger,
}

impl OrderDetailOrchestrator {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        status: OrderStatusService,
        refunds: RefundService,
        labels: ShipmentLabelManager,
        ledger: InventoryLedger,
    ) -> Self {
        OrderDetailOrchestrator {
            orders,
            status,
            refunds,
            labels,
            ledger,
        }
    }

    /// Wires every service to one database and the given collaborators.
    pub fn with_database(
        db: Database,
        carrier: Arc<dyn CarrierClient>,
        payments: Arc<dyn PaymentProcessor>,
        config: &OpsConfig,
    ) -> Self {
        let db = Arc::new(db);
        OrderDetailOrchestrator::new(
            db.clone(),
            OrderStatusService::new(db.clone()),
            RefundService::new(db.clone(), payments, config.payments.currency.clone()),
            ShipmentLabelManager::new(db.clone(), carrier),
            InventoryLedger::new(db, config.inventory.reason_codes.clone()),
        )
    }

    /// Opens the configured database and builds the HTTP clients.
    pub async fn connect(config: &OpsConfig) -> OpsResult<Self> {
        config.validate()?;
        let db = Database::new(config.database.db_config()).await?;
        let carrier = Arc::new(HttpCarrierClient::new(&config.carrier)?);
        let payments = Arc::new(HttpPaymentProcessor::new(&config.payments)?);

        info!(database = %config.database.path.display(), "Order services ready");
        Ok(Self::with_database(db, carrier, payments, config))
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn labels(&self) -> &ShipmentLabelManager {
        &self.labels
    }

    pub fn refunds(&self) -> &RefundService {
        &self.refunds
    }

    pub fn status(&self) -> &OrderStatusService {
        &self.status
    }

    /// Reads the whole screen.
    ///
    /// Only the order detail is required; other failures become warnings.
    pub async fn load(&self, order_id: &str) -> OpsResult<OrderView> {
        let detail = self.orders.order_detail(order_id).await?;
        let mut warnings = Vec::new();

        let (shipment, shipment_known) = match self.labels.fetch_active_shipment(order_id).await {
            Ok(shipment) => (shipment, true),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Shipment lookup failed");
                warnings.push(format!("Shipment unavailable: {}", e));
                (None, false)
            }
        };

        let mut tracking = Vec::new();
        if let Some(active) = shipment.as_ref().filter(|s| !s.voided) {
            match self.labels.tracking_events(active).await {
                Ok(events) => tracking = events,
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Tracking lookup failed");
                    warnings.push(format!("Tracking unavailable: {}", e));
                }
            }
        }

        let pickup = match self.orders.order_pickup(order_id).await {
            Ok(pickup) => pickup,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Pickup lookup failed");
                warnings.push(format!("Pickup reservation unavailable: {}", e));
                None
            }
        };

        let status = detail.order.status;
        let guards = ActionGuards {
            // Unknown shipment state offers neither label action
            can_create_label: shipment_known && can_create_label(shipment.as_ref()),
            can_void_label: shipment_known && can_void_label(shipment.as_ref()),
            can_refund: can_refund(&detail.order),
            can_cancel: can_cancel(status),
            available_transitions: available_transitions(status),
            can_mark_picked_up: can_mark_picked_up(pickup.as_ref()),
        };

        debug!(order_id = %order_id, warnings = warnings.len(), "Order view loaded");
        Ok(OrderView {
            detail,
            shipment,
            tracking,
            pickup,
            guards,
            warnings,
        })
    }

    /// Runs one action and reloads the view.
    ///
    /// The action's own failure is reported in `outcome`; only a failure to
    /// reload the order is returned as an error.
    pub async fn dispatch(
        &self,
        order_id: &str,
        action: OrderAction,
        actor: &ActorId,
    ) -> OpsResult<DispatchReport> {
        let panel = action.panel();

        let outcome = match self.run(order_id, action, actor).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(order_id = %order_id, ?panel, error = %e, "Order action failed");
                Err(PanelError::from(e))
            }
        };

        let mut view = self.load(order_id).await?;

        let applied = match &outcome {
            Ok(ActionOutcome::StatusChanged(applied)) => Some(applied),
            Ok(ActionOutcome::PickedUp(picked_up)) => picked_up.transition.as_ref(),
            _ => None,
        };

        let (mut released, mut reserved) = (None, None);
        if let Some(applied) = applied {
            if applied.effects.notify_customer {
                info!(
                    order_id = %order_id,
                    status = %applied.entry.to_status,
                    "Customer notification eligible"
                );
            }
            if applied.effects.release_inventory {
                released = self.move_stock(order_id, true, &mut view, actor).await;
            } else if applied.effects.reserve_inventory {
                reserved = self.move_stock(order_id, false, &mut view, actor).await;
            }
        }

        Ok(DispatchReport {
            panel,
            outcome,
            released,
            reserved,
            view,
        })
    }

    /// Releases (`release == true`) or re-reserves the order's stock if the
    /// order's flag says it has not moved that way yet.
    async fn move_stock(
        &self,
        order_id: &str,
        release: bool,
        view: &mut OrderView,
        actor: &ActorId,
    ) -> Option<BulkSaveReport> {
        let action = if release { "release" } else { "reservation" };

        match self.orders.set_stock_released(order_id, release).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(order_id = %order_id, action, "Stock already moved; skipping");
                return None;
            }
            Err(e) => {
                warn!(order_id = %order_id, action, error = %e, "Stock flag not updated");
                view.warnings.push(format!("Stock {} skipped: {}", action, e));
                return None;
            }
        }

        let report = if release {
            self.ledger.release_order_stock(&view.detail.items, actor).await
        } else {
            self.ledger.reserve_order_stock(&view.detail.items, actor).await
        };
        if !report.is_complete_success() {
            view.warnings
                .push(format!("Stock {} incomplete: {}", action, report.summary()));
        }
        Some(report)
    }

    async fn run(
        &self,
        order_id: &str,
        action: OrderAction,
        actor: &ActorId,
    ) -> OpsResult<ActionOutcome> {
        match action {
            OrderAction::Transition { target, note } => self
                .status
                .transition(order_id, target, note.as_deref(), actor)
                .await
                .map(ActionOutcome::StatusChanged),
            OrderAction::Cancel { note } => self
                .status
                .cancel(order_id, note.as_deref(), actor)
                .await
                .map(ActionOutcome::StatusChanged),
            OrderAction::MarkPickedUp { reservation_id } => self
                .status
                .mark_picked_up(order_id, &reservation_id, actor)
                .await
                .map(ActionOutcome::PickedUp),
            OrderAction::CreateLabel => self
                .labels
                .create_label(order_id, actor)
                .await
                .map(ActionOutcome::LabelCreated),
            OrderAction::VoidLabel { label_id } => {
                match self.labels.void_label(&label_id, actor).await? {
                    VoidOutcome::Voided(shipment) => Ok(ActionOutcome::LabelVoided(shipment)),
                    VoidOutcome::NotApproved { message } => {
                        Ok(ActionOutcome::VoidNotApproved { message })
                    }
                }
            }
            OrderAction::Refund(selection) => self
                .refunds
                .compute_and_submit(order_id, &selection, actor)
                .await
                .map(ActionOutcome::Refunded),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{FailingStore, FakeCarrier, FakePayments, StoreStep};
    use chrono::Utc;
    use tally_core::{Order, OrderItem, PaymentStatus, PickupStatus, ProductStock};
    use tally_db::{DbConfig, NewOrder};

    struct Harness {
        store: Arc<FailingStore>,
        carrier: Arc<FakeCarrier>,
        orchestrator: OrderDetailOrchestrator,
    }

    async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.inventory()
            .insert_product(&ProductStock {
                id: "p-tee".to_string(),
                sku: "TEE".to_string(),
                name: "Logo Tee".to_string(),
                stock_quantity: 4,
                low_stock_threshold: 1,
                updated_at: now,
            })
            .await
            .unwrap();
        db.orders()
            .insert(&NewOrder {
                order: Order {
                    id: "o-1".to_string(),
                    order_number: "1001".to_string(),
                    status: OrderStatus::Processing,
                    payment_status: PaymentStatus::Paid,
                    subtotal_cents: 6000,
                    shipping_cents: 0,
                    tax_cents: 0,
                    total_cents: 6000,
                    refunded_total_cents: 0,
                    payment_reference: Some("pi_1".to_string()),
                    customer_email: None,
                    created_at: now,
                    updated_at: now,
                },
                items: vec![OrderItem {
                    id: "o-1-tee".to_string(),
                    order_id: "o-1".to_string(),
                    product_id: "p-tee".to_string(),
                    name: "Logo Tee".to_string(),
                    unit_price_cents: 2000,
                    quantity: 3,
                    line_total_cents: 6000,
                }],
                actor_id: "system".to_string(),
            })
            .await
            .unwrap();

        let store = Arc::new(FailingStore::new(db));
        let carrier = Arc::new(FakeCarrier::new());
        let payments = Arc::new(FakePayments::new());
        let config = OpsConfig::default();

        let orchestrator = OrderDetailOrchestrator::new(
            store.clone(),
            OrderStatusService::new(store.clone()),
            RefundService::new(store.clone(), payments, "usd"),
            ShipmentLabelManager::new(store.clone(), carrier.clone()),
            InventoryLedger::new(store.clone(), config.inventory.reason_codes),
        );

        Harness {
            store,
            carrier,
            orchestrator,
        }
    }

    fn actor() -> ActorId {
        ActorId::new("admin-1").unwrap()
    }

    #[tokio::test]
    async fn test_load_computes_guards() {
        let h = harness().await;
        let view = h.orchestrator.load("o-1").await.unwrap();

        assert!(view.shipment.is_none());
        assert!(view.warnings.is_empty());
        assert!(view.guards.can_create_label);
        assert!(!view.guards.can_void_label);
        assert!(view.guards.can_refund);
        assert!(view.guards.can_cancel);
        assert!(!view.guards.can_mark_picked_up);
        assert!(!view
            .guards
            .available_transitions
            .contains(&OrderStatus::Processing));
    }

    #[tokio::test]
    async fn test_optional_failures_become_warnings() {
        let h = harness().await;
        h.orchestrator
            .dispatch("o-1", OrderAction::CreateLabel, &actor())
            .await
            .unwrap();
        h.carrier.fail_tracking().await;
        h.store.fail(StoreStep::OrderPickup).await;

        let view = h.orchestrator.load("o-1").await.unwrap();
        assert_eq!(view.warnings.len(), 2);
        assert!(view.shipment.is_some());

        h.store.fail(StoreStep::LatestShipment).await;
        let view = h.orchestrator.load("o-1").await.unwrap();
        assert!(view.shipment.is_none());
        assert!(!view.guards.can_create_label);
        assert!(!view.guards.can_void_label);
    }

    #[tokio::test]
    async fn test_missing_order_is_page_error() {
        let h = harness().await;
        assert!(h.orchestrator.load("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_failure_is_scoped_to_panel() {
        let h = harness().await;
        let report = h
            .orchestrator
            .dispatch(
                "o-1",
                OrderAction::Refund(RefundSelection::manual("100")),
                &actor(),
            )
            .await
            .unwrap();

        assert_eq!(report.panel, Panel::Refund);
        let err = report.outcome.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(report.view.detail.order.refunded_total_cents, 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_stock() {
        let h = harness().await;
        let report = h
            .orchestrator
            .dispatch("o-1", OrderAction::Cancel { note: None }, &actor())
            .await
            .unwrap();

        assert!(matches!(report.outcome, Ok(ActionOutcome::StatusChanged(_))));
        assert!(report.released.unwrap().is_complete_success());
        assert_eq!(report.view.detail.order.status, OrderStatus::Cancelled);
        assert!(!report.view.guards.can_cancel);

        let product = h.store.inner().inventory().get_product("p-tee").await.unwrap();
        assert_eq!(product.unwrap().stock_quantity, 7);
    }

    async fn tee_stock(h: &Harness) -> i64 {
        let product = h.store.inner().inventory().get_product("p-tee").await.unwrap();
        product.unwrap().stock_quantity
    }

    async fn set_status(h: &Harness, target: OrderStatus) -> DispatchReport {
        h.orchestrator
            .dispatch(
                "o-1",
                OrderAction::Transition { target, note: None },
                &actor(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancel_reopen_cycles_move_stock_once_each_way() {
        let h = harness().await;

        for _ in 0..2 {
            let report = h
                .orchestrator
                .dispatch("o-1", OrderAction::Cancel { note: None }, &actor())
                .await
                .unwrap();
            assert!(report.released.is_some());
            assert_eq!(tee_stock(&h).await, 7);

            let report = set_status(&h, OrderStatus::Processing).await;
            assert!(report.reserved.unwrap().is_complete_success());
            assert_eq!(tee_stock(&h).await, 4);
        }

        // Released, via refunded, back to on hold
        set_status(&h, OrderStatus::Cancelled).await;
        set_status(&h, OrderStatus::Refunded).await;
        let report = set_status(&h, OrderStatus::OnHold).await;
        assert!(report.reserved.is_some());
        assert_eq!(tee_stock(&h).await, 4);
    }

    #[tokio::test]
    async fn test_missed_reservation_blocks_the_next_release() {
        let h = harness().await;
        h.orchestrator
            .dispatch("o-1", OrderAction::Cancel { note: None }, &actor())
            .await
            .unwrap();
        assert_eq!(tee_stock(&h).await, 7);

        h.store.fail(StoreStep::StockReleasedFlag).await;
        let report = set_status(&h, OrderStatus::Processing).await;
        assert!(report.reserved.is_none());
        assert_eq!(report.view.warnings.len(), 1);
        h.store.heal(&StoreStep::StockReleasedFlag).await;

        // Stock was never taken back, so cancelling again must not add it twice
        let report = h
            .orchestrator
            .dispatch("o-1", OrderAction::Cancel { note: None }, &actor())
            .await
            .unwrap();
        assert!(report.released.is_none());
        assert_eq!(tee_stock(&h).await, 7);
    }

    #[tokio::test]
    async fn test_reopening_a_never_released_order_keeps_stock() {
        let h = harness().await;
        set_status(&h, OrderStatus::Completed).await;
        set_status(&h, OrderStatus::Refunded).await;

        let report = set_status(&h, OrderStatus::Processing).await;
        assert!(report.reserved.is_none());
        assert_eq!(tee_stock(&h).await, 4);
    }

    #[tokio::test]
    async fn test_stock_flag_failure_skips_release_with_warning() {
        let h = harness().await;
        h.store.fail(StoreStep::StockReleasedFlag).await;

        let report = h
            .orchestrator
            .dispatch("o-1", OrderAction::Cancel { note: None }, &actor())
            .await
            .unwrap();
        assert!(report.outcome.is_ok());
        assert!(report.released.is_none());
        assert!(report.view.warnings.iter().any(|w| w.starts_with("Stock release skipped")));
        assert_eq!(tee_stock(&h).await, 4);
    }

    #[tokio::test]
    async fn test_pickup_on_completed_order_clears_the_action() {
        let h = harness().await;
        h.store
            .inner()
            .pickups()
            .insert(&PickupReservation {
                id: "r-1".to_string(),
                order_id: "o-1".to_string(),
                status: PickupStatus::Scheduled,
                scheduled_for: Utc::now(),
                picked_up_at: None,
            })
            .await
            .unwrap();
        set_status(&h, OrderStatus::Completed).await;
        assert!(h.orchestrator.load("o-1").await.unwrap().guards.can_mark_picked_up);

        let report = h
            .orchestrator
            .dispatch(
                "o-1",
                OrderAction::MarkPickedUp {
                    reservation_id: "r-1".to_string(),
                },
                &actor(),
            )
            .await
            .unwrap();

        match &report.outcome {
            Ok(ActionOutcome::PickedUp(picked_up)) => assert_eq!(picked_up.transition, None),
            other => panic!("expected a pickup, got {:?}", other),
        }
        assert_eq!(report.panel, Panel::Pickup);
        assert!(!report.view.guards.can_mark_picked_up);
        assert_eq!(report.view.detail.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_void_not_approved_is_reported_as_outcome() {
        let h = harness().await;
        h.orchestrator
            .dispatch("o-1", OrderAction::CreateLabel, &actor())
            .await
            .unwrap();
        h.carrier.deny_voids("Void window has passed").await;

        let report = h
            .orchestrator
            .dispatch(
                "o-1",
                OrderAction::VoidLabel {
                    label_id: "lbl_1".to_string(),
                },
                &actor(),
            )
            .await
            .unwrap();
        assert!(matches!(
            report.outcome,
            Ok(ActionOutcome::VoidNotApproved { .. })
        ));
        assert!(report.view.guards.can_void_label);
    }
}
