//! # Shipment Label Manager
//!
//! Buys and voids shipping labels and keeps the shipment rows in step.
//!
//! ## Label Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   (no shipment) ──create──► label_created ──void──► voided             │
//! │        ▲                                               │                │
//! │        └──────────────── create (new row) ─────────────┘                │
//! │                                                                         │
//! │  can_create_label: no shipment, or latest is voided                     │
//! │  can_void_label:   latest has a label id and is not voided              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The create guard is advisory. Nothing in the store prevents two sessions
//! that both saw "no active label" from buying two labels.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::carrier::{CarrierClient, PurchasedLabel};
use crate::error::{OpsError, OpsResult};
use crate::store::ShipmentStore;
use tally_core::shipment::{can_create_label, can_void_label};
use tally_core::{ActorId, Shipment, ShipmentStatus, TrackingEvent};
use tally_db::DbError;

/// Result of a void request that reached the carrier.
#[derive(Debug, Clone, PartialEq)]
pub enum VoidOutcome {
    /// The carrier approved; the row is marked voided.
    Voided(Shipment),

    /// The carrier refused (e.g. past the void window). Nothing changed.
    NotApproved { message: String },
}

/// Shipment label service.
#[derive(Clone)]
pub struct ShipmentLabelManager {
    store: Arc<dyn ShipmentStore>,
    carrier: Arc<dyn CarrierClient>,
}

impl ShipmentLabelManager {
    pub fn new(store: Arc<dyn ShipmentStore>, carrier: Arc<dyn CarrierClient>) -> Self {
        ShipmentLabelManager { store, carrier }
    }

    /// The most recently created shipment of the order, voided or not.
    ///
    /// "No rows" is `Ok(None)`; other failures are returned for the caller
    /// to downgrade.
    pub async fn fetch_active_shipment(&self, order_id: &str) -> OpsResult<Option<Shipment>> {
        match self.store.latest_shipment(order_id).await {
            Ok(shipment) => Ok(shipment),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Buys a label for the order and records it as a new shipment row.
    ///
    /// ## Errors
    /// - `OpsError::LabelNotAllowed` - an active label exists
    /// - `OpsError::Carrier` / `OpsError::Transport` - nothing purchased
    /// - `OpsError::LabelNotRecorded` - purchased but not saved
    pub async fn create_label(&self, order_id: &str, actor: &ActorId) -> OpsResult<Shipment> {
        let latest = self.fetch_active_shipment(order_id).await?;
        if !can_create_label(latest.as_ref()) {
            return Err(OpsError::LabelNotAllowed {
                order_id: order_id.to_string(),
            });
        }

        warn!(
            order_id = %order_id,
            "Label guard is advisory; concurrent sessions can purchase duplicate labels"
        );

        let label = self.carrier.create_label(order_id).await?;
        let shipment = new_shipment(order_id, label, actor);

        if let Err(e) = self.store.insert_shipment(&shipment).await {
            let label_id = shipment.label_id.clone().unwrap_or_default();
            error!(
                order_id = %order_id,
                label_id = %label_id,
                error = %e,
                "Label purchased but shipment not recorded"
            );
            return Err(OpsError::LabelNotRecorded {
                label_id,
                reason: e.to_string(),
            });
        }

        info!(
            order_id = %order_id,
            label_id = ?shipment.label_id,
            cost = shipment.cost_cents,
            actor = %actor,
            "Shipping label created"
        );
        Ok(shipment)
    }

    /// Asks the carrier to void a label and marks the row voided on approval.
    ///
    /// ## Errors
    /// - `OpsError::NotFound` - no shipment carries the label
    /// - `OpsError::VoidNotAllowed` - label is not the order's active label
    /// - `OpsError::Carrier` / `OpsError::Transport` - carrier call failed
    /// - `OpsError::VoidNotRecorded` - voided by the carrier but not saved
    pub async fn void_label(&self, label_id: &str, actor: &ActorId) -> OpsResult<VoidOutcome> {
        let shipment = self
            .store
            .shipment_by_label(label_id)
            .await?
            .ok_or_else(|| OpsError::not_found("Shipment label", label_id))?;

        let latest = self.fetch_active_shipment(&shipment.order_id).await?;
        let is_latest = latest.as_ref().map(|s| s.id.as_str()) == Some(shipment.id.as_str());
        if !is_latest || !can_void_label(latest.as_ref()) {
            return Err(OpsError::VoidNotAllowed {
                label_id: label_id.to_string(),
            });
        }

        let decision = self.carrier.void_label(label_id).await?;
        if !decision.approved {
            info!(label_id = %label_id, message = %decision.message, "Carrier did not approve void");
            return Ok(VoidOutcome::NotApproved {
                message: decision.message,
            });
        }

        match self.store.mark_shipment_voided(&shipment.id).await {
            Ok(voided) => {
                info!(label_id = %label_id, actor = %actor, "Shipping label voided");
                Ok(VoidOutcome::Voided(voided))
            }
            Err(e) => {
                error!(label_id = %label_id, error = %e, "Label voided by carrier but not recorded");
                Err(OpsError::VoidNotRecorded {
                    label_id: label_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Carrier tracking events of a shipment. Empty when it has no label.
    pub async fn tracking_events(&self, shipment: &Shipment) -> OpsResult<Vec<TrackingEvent>> {
        match shipment.label_id.as_deref() {
            Some(label_id) if !label_id.trim().is_empty() => {
                debug!(label_id = %label_id, "Fetching tracking events");
                self.carrier.tracking_events(label_id).await
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn new_shipment(order_id: &str, label: PurchasedLabel, actor: &ActorId) -> Shipment {
    Shipment {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        label_id: Some(label.label_id),
        tracking_number: label.tracking_number,
        carrier_code: label.carrier_code,
        service_code: label.service_code,
        label_url: label.label_url,
        cost_cents: label.cost_cents,
        status: ShipmentStatus::LabelCreated,
        voided: false,
        voided_at: None,
        created_by: actor.as_str().to_string(),
        created_at: Utc::now(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
