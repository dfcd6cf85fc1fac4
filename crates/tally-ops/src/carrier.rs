//! # Carrier Label Service Client
//!
//! Buys, voids and tracks shipping labels.
//!
//! ## Wire Format
//! ```text
//! POST {base}/labels                     {"order_id": "..."}
//!   200 → {"label_id", "tracking_number", "label_url", "cost",
//!          "carrier_code", "service_code"}
//!
//! POST {base}/labels/{label_id}/void
//!   200 → {"approved": bool, "message": "..."}
//!
//! GET  {base}/labels/{label_id}/tracking
//!   200 → {"events": [{"occurred_at", "status", "description", "location"}]}
//!
//! non-2xx → {"code", "message", "details"?}
//! ```
//!
//! `cost` arrives as a decimal (string or JSON number) and is converted to
//! cents by parsing its text. It never passes through float arithmetic.
//!
//! A 2xx label body that names a `label_id` means the label was sold. If
//! the rest of that body cannot be used, the error is
//! `OpsError::LabelNotRecorded`, which is never retried: buying again would
//! buy a second label.

use async_trait::async_trait;
use std::time::Duration;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::config::{CarrierSettings, ConfigError};
use crate::error::{OpsError, OpsResult};
use tally_core::{Money, TrackingEvent};

const SERVICE: &str = "carrier";

// =============================================================================
// Types
// =============================================================================

/// A label the carrier sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasedLabel {
    pub label_id: String,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub cost_cents: i64,
    pub carrier_code: String,
    pub service_code: String,
}

/// The carrier's answer to a void request.
///
/// `approved == false` is a normal answer (e.g. past the void window),
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoidDecision {
    pub approved: bool,
    #[serde(default)]
    pub message: String,
}

/// Carrier label service operations.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn create_label(&self, order_id: &str) -> OpsResult<PurchasedLabel>;

    async fn void_label(&self, label_id: &str) -> OpsResult<VoidDecision>;

    async fn tracking_events(&self, label_id: &str) -> OpsResult<Vec<TrackingEvent>>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct CreateLabelBody<'a> {
    order_id: &'a str,
}

#[derive(Deserialize)]
struct LabelResponse {
    label_id: String,
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    label_url: Option<String>,
    cost: serde_json::Value,
    carrier_code: String,
    service_code: String,
}

#[derive(Deserialize)]
struct TrackingResponse {
    #[serde(default)]
    events: Vec<TrackingEvent>,
}

#[derive(Deserialize)]
struct CarrierErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl LabelResponse {
    /// Decodes a 2xx label body.
    fn from_body(body: serde_json::Value) -> OpsResult<PurchasedLabel> {
        let label_id = body
            .get("label_id")
            .and_then(|id| id.as_str())
            .map(str::to_string);

        match serde_json::from_value::<LabelResponse>(body) {
            Ok(response) => response.into_label(),
            Err(e) => match label_id {
                Some(label_id) => Err(unusable_label(label_id, e.to_string())),
                None => Err(OpsError::transport(SERVICE, e)),
            },
        }
    }

    fn into_label(self) -> OpsResult<PurchasedLabel> {
        let cost_cents = match parse_cost(&self.cost) {
            Ok(cents) => cents,
            Err(reason) => return Err(unusable_label(self.label_id, reason)),
        };
        Ok(PurchasedLabel {
            label_id: self.label_id,
            tracking_number: self.tracking_number,
            label_url: self.label_url,
            cost_cents,
            carrier_code: self.carrier_code,
            service_code: self.service_code,
        })
    }
}

fn unusable_label(label_id: String, reason: String) -> OpsError {
    error!(label_id = %label_id, reason = %reason, "Carrier sold a label with an unusable response");
    OpsError::LabelNotRecorded {
        label_id,
        reason: format!("carrier response could not be decoded: {}", reason),
    }
}

/// Converts a decimal `cost` (string or number) to cents.
fn parse_cost(cost: &serde_json::Value) -> Result<i64, String> {
    let text = match cost {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(format!("label cost is not a decimal: {}", other)),
    };

    match Money::parse_decimal(&text) {
        Ok(cost) if !cost.is_negative() => Ok(cost.cents()),
        _ => Err(format!("label cost is not a valid amount: {}", text)),
    }
}

// =============================================================================
// HTTP Client
// =============================================================================

/// `reqwest`-backed [`CarrierClient`].
#[derive(Debug, Clone)]
pub struct HttpCarrierClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpCarrierClient {
    pub fn new(settings: &CarrierSettings) -> OpsResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("tally-ops/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| OpsError::transport(SERVICE, e))?;

        let base_url = Url::parse(&settings.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidUrl {
                field: "carrier.base_url".to_string(),
                reason: format!("not a base URL: {}", settings.base_url),
            })?;

        Ok(HttpCarrierClient {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> OpsResult<T> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| OpsError::transport(SERVICE, e))?;
        decode(response).await
    }
}

/// Decodes a 2xx body as `T`, anything else as the structured error.
async fn decode<T: DeserializeOwned>(response: Response) -> OpsResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| OpsError::transport(SERVICE, e));
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<CarrierErrorBody>(&body) {
        Ok(err) => Err(OpsError::Carrier {
            code: err.code,
            message: err.message,
            details: err.details,
        }),
        Err(_) => Err(OpsError::Carrier {
            code: format!("http_{}", status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("Unexpected carrier response")
                .to_string(),
            details: (!body.is_empty()).then(|| serde_json::Value::String(body)),
        }),
    }
}

#[async_trait]
impl CarrierClient for HttpCarrierClient {
    async fn create_label(&self, order_id: &str) -> OpsResult<PurchasedLabel> {
        debug!(order_id = %order_id, "Requesting carrier label");

        let request = self
            .client
            .post(self.url(&["labels"]))
            .json(&CreateLabelBody { order_id });
        let body: serde_json::Value = self.send(request).await?;
        let label = LabelResponse::from_body(body)?;

        info!(order_id = %order_id, label_id = %label.label_id, cost = label.cost_cents, "Carrier label purchased");
        Ok(label)
    }

    async fn void_label(&self, label_id: &str) -> OpsResult<VoidDecision> {
        debug!(label_id = %label_id, "Requesting label void");

        let request = self.client.post(self.url(&["labels", label_id, "void"]));
        self.send(request).await
    }

    async fn tracking_events(&self, label_id: &str) -> OpsResult<Vec<TrackingEvent>> {
        let request = self
            .client
            .get(self.url(&["labels", label_id, "tracking"]));
        let tracking: TrackingResponse = self.send(request).await?;
        Ok(tracking.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(cost: serde_json::Value) -> LabelResponse {
        serde_json::from_value(json!({
            "label_id": "lbl_1",
            "tracking_number": "1Z999",
            "label_url": "https://labels.example.com/lbl_1.pdf",
            "cost": cost,
            "carrier_code": "ups",
            "service_code": "ground"
        }))
        .unwrap()
    }

    #[test]
    fn test_cost_parsed_from_string_and_number() {
        assert_eq!(label(json!("8.95")).into_label().unwrap().cost_cents, 895);
        assert_eq!(label(json!(8.95)).into_label().unwrap().cost_cents, 895);
        assert_eq!(label(json!(12)).into_label().unwrap().cost_cents, 1200);
    }

    #[test]
    fn test_bad_cost_on_sold_label_is_not_recorded() {
        for cost in [json!("free"), json!("-1.00"), json!(null)] {
            let err = label(cost).into_label().unwrap_err();
            assert!(!err.is_retryable());
            match err {
                OpsError::LabelNotRecorded { label_id, .. } => assert_eq!(label_id, "lbl_1"),
                other => panic!("expected LabelNotRecorded, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_label_body_decoding() {
        let sold = LabelResponse::from_body(json!({
            "label_id": "lbl_9",
            "cost": "4.10",
            "carrier_code": "usps",
            "service_code": "priority"
        }))
        .unwrap();
        assert_eq!(sold.cost_cents, 410);
        assert_eq!(sold.tracking_number, None);

        // Sold, but a required field is missing
        let err = LabelResponse::from_body(json!({ "label_id": "lbl_9", "cost": "4.10" }))
            .unwrap_err();
        assert!(matches!(err, OpsError::LabelNotRecorded { ref label_id, .. } if label_id == "lbl_9"));

        // Nothing identifies a sold label
        let err = LabelResponse::from_body(json!({ "status": "ok" })).unwrap_err();
        assert!(matches!(err, OpsError::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_void_decision_message_defaults() {
        let decision: VoidDecision = serde_json::from_value(json!({ "approved": true })).unwrap();
        assert!(decision.approved);
        assert!(decision.message.is_empty());
    }

    #[test]
    fn test_urls_are_joined_without_double_slash() {
        let client = HttpCarrierClient::new(&CarrierSettings {
            base_url: "https://labels.example.com/v1/".to_string(),
            api_key: Some("ck_test".to_string()),
            ..CarrierSettings::default()
        })
        .unwrap();
        assert_eq!(
            client.url(&["labels", "lbl_1", "void"]).as_str(),
            "https://labels.example.com/v1/labels/lbl_1/void"
        );
    }

    #[test]
    fn test_label_id_is_one_encoded_segment() {
        let client = HttpCarrierClient::new(&CarrierSettings {
            base_url: "https://labels.example.com/v1".to_string(),
            ..CarrierSettings::default()
        })
        .unwrap();

        let url = client.url(&["labels", "../admin?x=1#y", "void"]);
        assert_eq!(
            url.as_str(),
            "https://labels.example.com/v1/labels/..%2Fadmin%3Fx=1%23y/void"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().count(), 4);
    }

    #[test]
    fn test_base_url_must_be_hierarchical() {
        let err = HttpCarrierClient::new(&CarrierSettings {
            base_url: "mailto:labels@example.com".to_string(),
            ..CarrierSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, OpsError::Config(ConfigError::InvalidUrl { .. })));
    }
}
