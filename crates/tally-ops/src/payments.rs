//! # Payment Processor Client
//!
//! Submits refunds against an order's payment reference.
//!
//! ```text
//! POST {base}/refunds
//!   {"payment_reference", "amount", "currency", "reason",
//!    "items": [{"order_item_id", "quantity", "amount"}]}
//!
//!   2xx     → {"refund_id", "status"}
//!   non-2xx → {"code", "message"}
//! ```
//!
//! Amounts are integer minor units.

use async_trait::async_trait;
use std::time::Duration;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PaymentSettings;
use crate::error::{OpsError, OpsResult};
use tally_core::refund::RefundPlan;

const SERVICE: &str = "payment processor";

// =============================================================================
// Types
// =============================================================================

/// One refunded line as sent to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedItem {
    pub order_item_id: String,
    pub quantity: i64,
    pub amount: i64,
}

/// Refund request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundSubmission {
    pub payment_reference: String,
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub items: Vec<SubmittedItem>,
}

impl RefundSubmission {
    pub fn from_plan(payment_reference: &str, currency: &str, plan: &RefundPlan) -> Self {
        RefundSubmission {
            payment_reference: payment_reference.to_string(),
            amount: plan.amount_cents,
            currency: currency.to_string(),
            reason: plan.reason.clone(),
            items: plan
                .items
                .iter()
                .map(|item| SubmittedItem {
                    order_item_id: item.order_item_id.clone(),
                    quantity: item.quantity,
                    amount: item.amount_cents,
                })
                .collect(),
        }
    }
}

/// The processor's acceptance of a refund.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorRefund {
    pub refund_id: String,
    #[serde(default)]
    pub status: String,
}

/// Payment processor operations.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn submit_refund(&self, submission: &RefundSubmission) -> OpsResult<ProcessorRefund>;
}

#[derive(Deserialize)]
struct PaymentErrorBody {
    code: String,
    message: String,
}

// =============================================================================
// HTTP Client
// =============================================================================

/// `reqwest`-backed [`PaymentProcessor`].
#[derive(Debug, Clone)]
pub struct HttpPaymentProcessor {
    client: Client,
    refunds_url: String,
    api_key: Option<String>,
}

impl HttpPaymentProcessor {
    pub fn new(settings: &PaymentSettings) -> OpsResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("tally-ops/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| OpsError::transport(SERVICE, e))?;

        Ok(HttpPaymentProcessor {
            client,
            refunds_url: format!("{}/refunds", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn submit_refund(&self, submission: &RefundSubmission) -> OpsResult<ProcessorRefund> {
        debug!(
            payment_reference = %submission.payment_reference,
            amount = submission.amount,
            "Submitting refund"
        );

        let mut request = self.client.post(&self.refunds_url).json(submission);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpsError::transport(SERVICE, e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<PaymentErrorBody>(&body) {
                Ok(err) => OpsError::Payment {
                    code: err.code,
                    message: err.message,
                },
                Err(_) => OpsError::Payment {
                    code: format!("http_{}", status.as_u16()),
                    message: status
                        .canonical_reason()
                        .unwrap_or("Unexpected processor response")
                        .to_string(),
                },
            });
        }

        let refund = response
            .json::<ProcessorRefund>()
            .await
            .map_err(|e| OpsError::transport(SERVICE, e))?;
        check_status(refund)
    }
}

/// A 2xx body may still report a failed refund.
fn check_status(refund: ProcessorRefund) -> OpsResult<ProcessorRefund> {
    match refund.status.as_str() {
        "failed" | "canceled" | "cancelled" => Err(OpsError::Payment {
            code: format!("refund_{}", refund.status),
            message: format!("Processor reported refund {} as {}", refund.refund_id, refund.status),
        }),
        _ => {
            info!(refund_id = %refund.refund_id, status = %refund.status, "Processor accepted refund");
            Ok(refund)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::refund::PlannedRefundItem;

    #[test]
    fn test_submission_body_uses_minor_units() {
        let plan = RefundPlan {
            amount_cents: 4000,
            computed_cents: 4000,
            manual_override: false,
            items: vec![PlannedRefundItem {
                order_item_id: "item-1".to_string(),
                quantity: 2,
                amount_cents: 4000,
                description: "2 × Logo Tee".to_string(),
            }],
            reason: Some("damaged".to_string()),
        };

        let body = serde_json::to_value(RefundSubmission::from_plan("pi_123", "usd", &plan)).unwrap();
        assert_eq!(body["payment_reference"], "pi_123");
        assert_eq!(body["amount"], 4000);
        assert_eq!(body["currency"], "usd");
        assert_eq!(body["items"][0]["quantity"], 2);
        assert_eq!(body["items"][0]["amount"], 4000);
    }

    #[test]
    fn test_failed_status_in_success_body_is_payment_error() {
        let refund = ProcessorRefund {
            refund_id: "re_1".to_string(),
            status: "failed".to_string(),
        };
        assert!(matches!(
            check_status(refund),
            Err(OpsError::Payment { ref code, .. }) if code == "refund_failed"
        ));

        let refund = ProcessorRefund {
            refund_id: "re_2".to_string(),
            status: "succeeded".to_string(),
        };
        assert_eq!(check_status(refund).unwrap().refund_id, "re_2");
    }
}
