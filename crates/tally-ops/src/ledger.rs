//! # Inventory Ledger
//!
//! Signed stock adjustments against batches, bulk product stock edits, and
//! stock release for cancelled orders.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AdjustmentRequest                                                      │
//! │       │ validate: delta ≠ 0, reason code allowed, notes ≤ 500          │
//! │       ▼                                                                 │
//! │  batch exists? ── no ──► OpsError::NotFound                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Phase 1: INSERT ledger entry ── fails ──► OpsError::LedgerWrite       │
//! │       │                                    (batch untouched)            │
//! │       ▼                                                                 │
//! │  Phase 2: batch q = MAX(0, q + delta) ── fails ──►                     │
//! │       │                          OpsError::StockNotUpdated              │
//! │       ▼                          (entry exists, stock unchanged)        │
//! │  AdjustmentResult                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};
use crate::store::InventoryStore;
use tally_core::inventory::{AdjustmentRequest, BulkSaveReport, BulkStockEdit};
use tally_core::validation::validate_stock_target;
use tally_core::{ActorId, InventoryAdjustment, InventoryBatch, OrderItem};

/// Outcome of a fully applied adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentResult {
    pub adjustment: InventoryAdjustment,
    pub quantity_actual: i64,
    pub quantity_available: i64,
    pub low_stock: bool,
}

/// Inventory ledger service.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    reason_codes: Vec<String>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>, reason_codes: Vec<String>) -> Self {
        InventoryLedger {
            store,
            reason_codes,
        }
    }

    /// Logs an adjustment, then applies it to the batch.
    ///
    /// ## Errors
    /// - `OpsError::Validation` - nothing written
    /// - `OpsError::NotFound` - unknown batch, nothing written
    /// - `OpsError::LedgerWrite` - entry not written, batch untouched
    /// - `OpsError::StockNotUpdated` - entry written, batch not updated
    pub async fn apply_adjustment(
        &self,
        request: &AdjustmentRequest,
        actor: &ActorId,
    ) -> OpsResult<AdjustmentResult> {
        let notes = request.validate(&self.reason_codes)?;

        if self.store.batch(&request.batch_id).await?.is_none() {
            return Err(OpsError::not_found("InventoryBatch", &request.batch_id));
        }

        let adjustment = InventoryAdjustment {
            id: Uuid::new_v4().to_string(),
            batch_id: request.batch_id.clone(),
            quantity_delta: request.delta,
            adjustment_type: request.adjustment_type,
            reason_code: request.reason_code.trim().to_string(),
            notes,
            actor_id: actor.as_str().to_string(),
            created_at: Utc::now(),
        };

        // Phase 1
        self.store
            .insert_adjustment(&adjustment)
            .await
            .map_err(|e| OpsError::LedgerWrite {
                batch_id: request.batch_id.clone(),
                reason: e.to_string(),
            })?;

        // Phase 2
        let batch = match self
            .store
            .apply_batch_delta(&request.batch_id, request.delta)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(
                    adjustment_id = %adjustment.id,
                    batch_id = %request.batch_id,
                    delta = request.delta,
                    error = %e,
                    "Adjustment logged but stock not updated"
                );
                return Err(OpsError::StockNotUpdated {
                    adjustment_id: adjustment.id,
                    batch_id: request.batch_id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        info!(
            batch_id = %batch.id,
            delta = request.delta,
            quantity_available = batch.quantity_available,
            actor = %actor,
            "Inventory adjusted"
        );

        Ok(self.result(adjustment, &batch))
    }

    fn result(&self, adjustment: InventoryAdjustment, batch: &InventoryBatch) -> AdjustmentResult {
        let low_stock = batch.is_low_stock();
        if low_stock {
            warn!(
                batch_id = %batch.id,
                product_id = %batch.product_id,
                quantity_available = batch.quantity_available,
                threshold = batch.low_stock_threshold,
                "Batch at or below low-stock threshold"
            );
        }

        AdjustmentResult {
            adjustment,
            quantity_actual: batch.quantity_actual,
            quantity_available: batch.quantity_available,
            low_stock,
        }
    }

    /// Ledger entries of a batch, newest first.
    pub async fn history(&self, batch_id: &str) -> OpsResult<Vec<InventoryAdjustment>> {
        Ok(self.store.adjustments(batch_id).await?)
    }

    /// Writes every changed target independently.
    ///
    /// A failing product is reported and the rest continue. Each write sets
    /// the absolute target, so the last save wins over concurrent edits.
    pub async fn bulk_save(&self, edit: &BulkStockEdit, actor: &ActorId) -> BulkSaveReport {
        let mut report = BulkSaveReport::default();

        for change in edit.changes() {
            if let Err(e) = validate_stock_target(change.target) {
                report.record_failure(&change.product_id, e.to_string());
                continue;
            }

            match self
                .store
                .set_product_stock(&change.product_id, change.target)
                .await
            {
                Ok(product) => {
                    debug!(
                        product_id = %product.id,
                        delta = change.delta(),
                        stock = product.stock_quantity,
                        "Product stock saved"
                    );
                    report.record_success(&change.product_id);
                }
                Err(e) => {
                    warn!(product_id = %change.product_id, error = %e, "Product stock not saved");
                    report.record_failure(&change.product_id, e.to_string());
                }
            }
        }

        info!(actor = %actor, summary = %report, "Bulk stock save finished");
        report
    }

    /// Returns each item's quantity to its product's stock.
    pub async fn release_order_stock(&self, items: &[OrderItem], actor: &ActorId) -> BulkSaveReport {
        let report = self.move_order_stock(items, 1).await;
        if report.is_complete_success() {
            info!(actor = %actor, summary = %report, "Order stock released");
        } else {
            warn!(actor = %actor, summary = %report, "Order stock partially released");
        }
        report
    }

    /// Takes each item's quantity out of its product's stock again, clamping
    /// at zero.
    pub async fn reserve_order_stock(&self, items: &[OrderItem], actor: &ActorId) -> BulkSaveReport {
        let report = self.move_order_stock(items, -1).await;
        if report.is_complete_success() {
            info!(actor = %actor, summary = %report, "Order stock reserved again");
        } else {
            warn!(actor = %actor, summary = %report, "Order stock partially reserved");
        }
        report
    }

    async fn move_order_stock(&self, items: &[OrderItem], sign: i64) -> BulkSaveReport {
        let mut report = BulkSaveReport::default();
        for item in items {
            match self
                .store
                .adjust_product_stock(&item.product_id, sign * item.quantity)
                .await
            {
                Ok(_) => report.record_success(&item.product_id),
                Err(e) => report.record_failure(&item.product_id, e.to_string()),
            }
        }
        report
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, StoreStep};
    use tally_core::{AdjustmentType, ProductStock, ValidationError};
    use tally_db::{Database, DbConfig};

    async fn setup() -> (Arc<FailingStore>, InventoryLedger) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.inventory()
            .insert_product(&ProductStock {
                id: "p-1".to_string(),
                sku: "TEE-BLK-M".to_string(),
                name: "Logo Tee".to_string(),
                stock_quantity: 10,
                low_stock_threshold: 2,
                updated_at: now,
            })
            .await
            .unwrap();
        db.inventory()
            .insert_batch(&InventoryBatch {
                id: "b-1".to_string(),
                product_id: "p-1".to_string(),
                quantity_actual: 5,
                quantity_available: 5,
                low_stock_threshold: 2,
                updated_at: now,
            })
            .await
            .unwrap();

        let store = Arc::new(FailingStore::new(db));
        let ledger = InventoryLedger::new(
            store.clone(),
            vec!["cycle_count".to_string(), "lost".to_string()],
        );
        (store, ledger)
    }

    fn request(delta: i64) -> AdjustmentRequest {
        AdjustmentRequest {
            batch_id: "b-1".to_string(),
            delta,
            adjustment_type: AdjustmentType::Loss,
            reason_code: "lost".to_string(),
            notes: Some("  pallet dropped  ".to_string()),
        }
    }

    fn actor() -> ActorId {
        ActorId::new("admin-1").unwrap()
    }

    #[tokio::test]
    async fn test_adjustment_clamps_and_flags_low_stock() {
        let (_, ledger) = setup().await;

        let result = ledger.apply_adjustment(&request(-8), &actor()).await.unwrap();
        assert_eq!(result.quantity_available, 0);
        assert_eq!(result.quantity_actual, 0);
        assert!(result.low_stock);
        assert_eq!(result.adjustment.quantity_delta, -8);
        assert_eq!(result.adjustment.notes.as_deref(), Some("pallet dropped"));

        let history = ledger.history("b-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actor_id, "admin-1");
    }

    #[tokio::test]
    async fn test_validation_writes_nothing() {
        let (_, ledger) = setup().await;

        let err = ledger.apply_adjustment(&request(0), &actor()).await.unwrap_err();
        assert!(matches!(
            err,
            OpsError::Validation(ValidationError::MustBeNonZero { .. })
        ));

        let mut bad_reason = request(-1);
        bad_reason.reason_code = "vibes".to_string();
        let err = ledger.apply_adjustment(&bad_reason, &actor()).await.unwrap_err();
        assert!(matches!(
            err,
            OpsError::Validation(ValidationError::NotAllowed { .. })
        ));

        assert!(ledger.history("b-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let (_, ledger) = setup().await;
        let mut req = request(1);
        req.batch_id = "b-9".to_string();
        let err = ledger.apply_adjustment(&req, &actor()).await.unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn test_ledger_write_failure_leaves_batch_untouched() {
        let (store, ledger) = setup().await;
        store.fail(StoreStep::InsertAdjustment).await;

        let err = ledger.apply_adjustment(&request(-2), &actor()).await.unwrap_err();
        assert!(matches!(err, OpsError::LedgerWrite { .. }));

        let batch = store.batch("b-1").await.unwrap().unwrap();
        assert_eq!(batch.quantity_available, 5);
    }

    #[tokio::test]
    async fn test_stock_update_failure_is_distinct_state() {
        let (store, ledger) = setup().await;
        store.fail(StoreStep::BatchDelta).await;

        let err = ledger.apply_adjustment(&request(-2), &actor()).await.unwrap_err();
        let adjustment_id = match err {
            OpsError::StockNotUpdated { adjustment_id, .. } => adjustment_id,
            other => panic!("expected StockNotUpdated, got {:?}", other),
        };

        // The entry exists, the quantity does not reflect it
        let history = ledger.history("b-1").await.unwrap();
        assert_eq!(history[0].id, adjustment_id);
        let batch = store.batch("b-1").await.unwrap().unwrap();
        assert_eq!(batch.quantity_available, 5);
    }

    #[tokio::test]
    async fn test_bulk_save_reports_each_product() {
        let (store, ledger) = setup().await;

        let mut edit = BulkStockEdit::new([("p-1", 10), ("p-ghost", 4)]);
        edit.set_target("p-1", 7);
        edit.set_target("p-ghost", 6);
        edit.set_target("p-neg", -1);

        let report = ledger.bulk_save(&edit, &actor()).await;
        assert_eq!(report.updated, vec!["p-1".to_string()]);
        assert_eq!(report.failed(), 2);
        assert!(report.summary().starts_with("updated 1"));

        let product = store.inner().inventory().get_product("p-1").await.unwrap();
        assert_eq!(product.unwrap().stock_quantity, 7);
    }

    #[tokio::test]
    async fn test_release_order_stock() {
        let (store, ledger) = setup().await;
        let item = OrderItem {
            id: "o-1-a".to_string(),
            order_id: "o-1".to_string(),
            product_id: "p-1".to_string(),
            name: "Logo Tee".to_string(),
            unit_price_cents: 2000,
            quantity: 3,
            line_total_cents: 6000,
        };

        let report = ledger.release_order_stock(&[item.clone()], &actor()).await;
        assert!(report.is_complete_success());
        let product = store.inner().inventory().get_product("p-1").await.unwrap();
        assert_eq!(product.unwrap().stock_quantity, 13);

        let report = ledger.reserve_order_stock(&[item], &actor()).await;
        assert!(report.is_complete_success());
        let product = store.inner().inventory().get_product("p-1").await.unwrap();
        assert_eq!(product.unwrap().stock_quantity, 10);
    }
}
