//! # Shipment Guards
//!
//! Label actions are derived from the latest shipment row of an order.
//!
//! ```text
//!   none ──create──► label_created ──void──► voided ──create──► (new row)
//!
//!   can_create_label = no shipment || latest.voided
//!   can_void_label   = latest.label_id.is_some() && !latest.voided
//! ```
//!
//! The guards are advisory: nothing in the store prevents two concurrent
//! callers from both seeing `can_create_label == true`.

use crate::types::Shipment;

/// Returns true when a new label may be purchased.
pub fn can_create_label(latest: Option<&Shipment>) -> bool {
    latest.map_or(true, |shipment| shipment.voided)
}

/// Returns true when the latest label may be voided.
pub fn can_void_label(latest: Option<&Shipment>) -> bool {
    latest.map_or(false, |shipment| {
        !shipment.voided
            && shipment
                .label_id
                .as_deref()
                .map_or(false, |id| !id.trim().is_empty())
    })
}

/// Picks the authoritative shipment: most recently created wins.
///
/// Ties keep the later element of the slice.
pub fn latest_shipment(shipments: &[Shipment]) -> Option<&Shipment> {
    shipments
        .iter()
        .fold(None, |latest: Option<&Shipment>, candidate| match latest {
            Some(current) if current.created_at > candidate.created_at => Some(current),
            _ => Some(candidate),
        })
}
