//! # Refund Service
//!
//! Plans a refund against the freshly loaded order, submits it to the
//! payment processor, and records it.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reload OrderDetail                                                     │
//! │       │ can_refund? ── no ──► OpsError::RefundNotAllowed               │
//! │       ▼                                                                 │
//! │  plan_refund(detail, selection) ── rejected ──► OpsError::Rejected     │
//! │       │                                          (nothing submitted)    │
//! │       ▼                                                                 │
//! │  processor.submit_refund ── fails ──► OpsError::Payment / Transport    │
//! │       │                               (nothing recorded)                │
//! │       ▼                                                                 │
//! │  store.record_refund (one transaction, total recomputed)               │
//! │       │ fails ──► OpsError::RefundNotRecorded { external_id }          │
//! │       ▼                                                                 │
//! │  Refund                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{error, info};

use crate::error::{OpsError, OpsResult};
use crate::payments::{PaymentProcessor, RefundSubmission};
use crate::store::OrderStore;
use tally_core::refund::{can_refund, plan_refund, RefundPlan, RefundSelection};
use tally_core::{ActorId, OrderDetail, Refund};

/// Refund calculator and submitter.
#[derive(Clone)]
pub struct RefundService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentProcessor>,
    currency: String,
}

impl RefundService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentProcessor>,
        currency: impl Into<String>,
    ) -> Self {
        RefundService {
            orders,
            payments,
            currency: currency.into(),
        }
    }

    /// Validates `selection` against the stored order without submitting.
    pub async fn preview(&self, order_id: &str, selection: &RefundSelection) -> OpsResult<RefundPlan> {
        let detail = self.orders.order_detail(order_id).await?;
        ensure_refundable(&detail)?;
        Ok(plan_refund(&detail, selection)?)
    }

    /// Computes, submits and records a refund.
    pub async fn compute_and_submit(
        &self,
        order_id: &str,
        selection: &RefundSelection,
        actor: &ActorId,
    ) -> OpsResult<Refund> {
        let detail = self.orders.order_detail(order_id).await?;
        let payment_reference = ensure_refundable(&detail)?;
        let plan = plan_refund(&detail, selection)?;

        let submission = RefundSubmission::from_plan(payment_reference, &self.currency, &plan);
        let accepted = self.payments.submit_refund(&submission).await?;

        match self
            .orders
            .record_refund(order_id, &plan, &accepted.refund_id, actor.as_str())
            .await
        {
            Ok(refund) => {
                info!(
                    order_id = %order_id,
                    refund_id = %refund.id,
                    external_id = %accepted.refund_id,
                    amount = plan.amount_cents,
                    manual = plan.manual_override,
                    actor = %actor,
                    "Refund issued"
                );
                Ok(refund)
            }
            Err(e) => {
                error!(
                    order_id = %order_id,
                    external_id = %accepted.refund_id,
                    amount = plan.amount_cents,
                    error = %e,
                    "Refund issued by processor but not recorded"
                );
                Err(OpsError::RefundNotRecorded {
                    external_id: accepted.refund_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Returns the payment reference of a refundable order.
fn ensure_refundable(detail: &OrderDetail) -> OpsResult<&str> {
    let order = &detail.order;
    let not_allowed = |reason: &str| OpsError::RefundNotAllowed {
        order_id: order.id.clone(),
        reason: reason.to_string(),
    };

    if !can_refund(order) {
        let reason = if order.payment_reference().is_none() {
            "no payment reference"
        } else if !order.remaining_refundable().is_positive() {
            "nothing left to refund"
        } else {
            "payment is not captured"
        };
        return Err(not_allowed(reason));
    }

    order
        .payment_reference()
        .ok_or_else(|| not_allowed("no payment reference"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, FakePayments, StoreStep};
    use chrono::Utc;
    use tally_core::{Order, OrderItem, OrderStatus, PaymentStatus, RefundRejection};
    use tally_db::{Database, DbConfig, NewOrder};

    /// Paid $100 order: 3 × $20 tee, 1 × $40 hoodie.
    fn order(id: &str, payment_reference: Option<&str>) -> NewOrder {
        let now = Utc::now();
        let item = |suffix: &str, unit: i64, quantity: i64| OrderItem {
            id: format!("{}-{}", id, suffix),
            order_id: id.to_string(),
            product_id: format!("prod-{}", suffix),
            name: format!("Item {}", suffix),
            unit_price_cents: unit,
            quantity,
            line_total_cents: unit * quantity,
        };
        NewOrder {
            order: Order {
                id: id.to_string(),
                order_number: format!("#{}", id),
                status: OrderStatus::Completed,
                payment_status: PaymentStatus::Paid,
                subtotal_cents: 10000,
                shipping_cents: 0,
                tax_cents: 0,
                total_cents: 10000,
                refunded_total_cents: 0,
                payment_reference: payment_reference.map(str::to_string),
                customer_email: Some("buyer@example.com".to_string()),
                created_at: now,
                updated_at: now,
            },
            items: vec![item("tee", 2000, 3), item("hoodie", 4000, 1)],
            actor_id: "admin-1".to_string(),
        }
    }

    async fn setup() -> (Arc<FailingStore>, Arc<FakePayments>, RefundService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.orders().insert(&order("o-1", Some("pi_1"))).await.unwrap();
        db.orders().insert(&order("o-2", None)).await.unwrap();

        let store = Arc::new(FailingStore::new(db));
        let payments = Arc::new(FakePayments::new());
        let service = RefundService::new(store.clone(), payments.clone(), "usd");
        (store, payments, service)
    }

    fn actor() -> ActorId {
        ActorId::new("admin-1").unwrap()
    }

    #[tokio::test]
    async fn test_item_refund_submits_and_records() {
        let (store, payments, service) = setup().await;

        let refund = service
            .compute_and_submit("o-1", &RefundSelection::items([("o-1-tee", 2)]), &actor())
            .await
            .unwrap();
        assert_eq!(refund.amount_cents, 4000);
        assert_eq!(refund.external_id.as_deref(), Some("re_1"));

        let submissions = payments.submissions().await;
        assert_eq!(submissions[0].payment_reference, "pi_1");
        assert_eq!(submissions[0].amount, 4000);

        let detail = store.order_detail("o-1").await.unwrap();
        assert_eq!(detail.order.refunded_total_cents, 4000);
        assert_eq!(detail.remaining_quantity("o-1-tee"), 1);
    }

    #[tokio::test]
    async fn test_rejection_never_reaches_processor() {
        let (_, payments, service) = setup().await;

        let err = service
            .compute_and_submit("o-1", &RefundSelection::manual("abc"), &actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpsError::Rejected(RefundRejection::InvalidAmount { .. })
        ));
        assert!(payments.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_order_without_payment_reference() {
        let (_, _, service) = setup().await;
        let err = service
            .compute_and_submit("o-2", &RefundSelection::full_order(), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::RefundNotAllowed { ref reason, .. } if reason == "no payment reference"));
    }

    #[tokio::test]
    async fn test_processor_failure_records_nothing() {
        let (store, payments, service) = setup().await;
        payments
            .fail_next(OpsError::Payment {
                code: "charge_disputed".into(),
                message: "The charge is under dispute".into(),
            })
            .await;

        let err = service
            .compute_and_submit("o-1", &RefundSelection::manual("10"), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Payment { .. }));

        let detail = store.order_detail("o-1").await.unwrap();
        assert_eq!(detail.order.refunded_total_cents, 0);
        assert!(detail.refunds.is_empty());
    }

    #[tokio::test]
    async fn test_issued_but_not_recorded() {
        let (store, _, service) = setup().await;
        store.fail(StoreStep::RecordRefund).await;

        let err = service
            .compute_and_submit("o-1", &RefundSelection::manual("10"), &actor())
            .await
            .unwrap_err();
        match err {
            OpsError::RefundNotRecorded { external_id, .. } => assert_eq!(external_id, "re_1"),
            other => panic!("expected RefundNotRecorded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fully_refunded_order_is_not_refundable() {
        let (_, _, service) = setup().await;
        service
            .compute_and_submit("o-1", &RefundSelection::full_order(), &actor())
            .await
            .unwrap();

        let err = service
            .preview("o-1", &RefundSelection::manual("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::RefundNotAllowed { .. }));
    }
}
