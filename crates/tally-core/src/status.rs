//! # Order Status Machine
//!
//! Pure transition rules over the closed [`OrderStatus`] enumeration.
//!
//! ## Transition Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Permissive machine: any status → any OTHER status                      │
//! │                                                                         │
//! │  pending_payment ⇄ processing ⇄ on_hold ⇄ completed                     │
//! │        ⇅               ⇅           ⇅          ⇅                         │
//! │     failed    ⇄    cancelled   ⇄  refunded  (no terminal states)        │
//! │                                                                         │
//! │  Restricted actions:                                                   │
//! │  • cancel       : not from cancelled / completed / refunded            │
//! │  • picked up    : only with a `scheduled` pickup reservation           │
//! │                   (an already completed order keeps its status)         │
//! │                                                                         │
//! │  Stock: pending_payment / processing / on_hold hold the order's items.  │
//! │  Leaving them for cancelled / failed releases, returning re-reserves.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operators must be able to correct mis-clicks, so even `cancelled` and
//! `refunded` can be moved out of. Callers go through
//! [`transition_allowed`] so the rule set can tighten without changing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{ActorId, OrderStatus, PickupReservation, PickupStatus};
use crate::validation::validate_note;

/// Returns true when `current → target` may be applied.
pub fn transition_allowed(current: OrderStatus, target: OrderStatus) -> bool {
    current != target
}

/// Returns true when the cancel action is offered.
pub fn can_cancel(current: OrderStatus) -> bool {
    !matches!(
        current,
        OrderStatus::Cancelled | OrderStatus::Completed | OrderStatus::Refunded
    )
}

/// Targets offered from `current`, in display order.
pub fn available_transitions(current: OrderStatus) -> Vec<OrderStatus> {
    OrderStatus::ALL
        .into_iter()
        .filter(|target| transition_allowed(current, *target))
        .collect()
}

/// Returns true when "mark picked up" is offered for this reservation.
pub fn can_mark_picked_up(reservation: Option<&PickupReservation>) -> bool {
    reservation.map_or(false, |r| r.status == PickupStatus::Scheduled)
}

// =============================================================================
// Effects
// =============================================================================

/// Side effects a transition makes eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransitionEffects {
    /// Return the order's item quantities to product stock.
    pub release_inventory: bool,
    /// Take the quantities out of stock again, if an earlier transition
    /// released them. The store keeps the released flag.
    pub reserve_inventory: bool,
    /// The customer may be notified of the new status.
    pub notify_customer: bool,
}

impl TransitionEffects {
    pub fn for_transition(from: OrderStatus, to: OrderStatus) -> Self {
        let releases = matches!(to, OrderStatus::Cancelled | OrderStatus::Failed);

        TransitionEffects {
            release_inventory: holds_stock(from) && releases,
            reserve_inventory: !holds_stock(from) && holds_stock(to),
            notify_customer: matches!(
                to,
                OrderStatus::Processing
                    | OrderStatus::Completed
                    | OrderStatus::Cancelled
                    | OrderStatus::Refunded
            ),
        }
    }
}

fn holds_stock(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::PendingPayment | OrderStatus::Processing | OrderStatus::OnHold
    )
}

// =============================================================================
// Status Change
// =============================================================================

/// A validated status change, ready to be persisted as one history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub actor_id: String,
    pub at: DateTime<Utc>,
    pub effects: TransitionEffects,
}

/// Validates a generic transition and builds the change to persist.
pub fn plan_transition(
    order_id: &str,
    current: OrderStatus,
    target: OrderStatus,
    note: Option<&str>,
    actor: &ActorId,
) -> CoreResult<StatusChange> {
    if current == target {
        return Err(CoreError::SameStatus { status: current });
    }
    if !transition_allowed(current, target) {
        return Err(CoreError::TransitionNotAllowed {
            from: current,
            to: target,
        });
    }

    Ok(StatusChange {
        order_id: order_id.to_string(),
        from: current,
        to: target,
        note: validate_note(note)?,
        actor_id: actor.as_str().to_string(),
        at: Utc::now(),
        effects: TransitionEffects::for_transition(current, target),
    })
}

/// Validates the cancel action and builds the change to persist.
pub fn plan_cancel(
    order_id: &str,
    current: OrderStatus,
    note: Option<&str>,
    actor: &ActorId,
) -> CoreResult<StatusChange> {
    if !can_cancel(current) {
        return Err(CoreError::CancelNotAllowed { status: current });
    }
    plan_transition(order_id, current, OrderStatus::Cancelled, note, actor)
}

/// "Mark picked up", ready to persist in one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupCompletion {
    pub reservation_id: String,
    pub order_id: String,
    pub at: DateTime<Utc>,
    /// `None` when the order is already `completed`. Only the reservation
    /// moves and no history entry is written.
    pub order_change: Option<StatusChange>,
}

/// Validates "mark picked up" for a reservation.
pub fn plan_pickup_completion(
    order_id: &str,
    current: OrderStatus,
    reservation: &PickupReservation,
    actor: &ActorId,
) -> CoreResult<PickupCompletion> {
    if reservation.order_id != order_id {
        return Err(CoreError::PickupOrderMismatch {
            reservation_id: reservation.id.clone(),
            order_id: order_id.to_string(),
        });
    }
    if !can_mark_picked_up(Some(reservation)) {
        return Err(CoreError::PickupNotScheduled {
            reservation_id: reservation.id.clone(),
            status: reservation.status,
        });
    }

    let order_change = if current == OrderStatus::Completed {
        None
    } else {
        Some(plan_transition(
            order_id,
            current,
            OrderStatus::Completed,
            Some("Picked up by customer"),
            actor,
        )?)
    };

    Ok(PickupCompletion {
        reservation_id: reservation.id.clone(),
        order_id: order_id.to_string(),
        at: order_change.as_ref().map_or_else(Utc::now, |change| change.at),
        order_change,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
