//! # Refund Calculator
//!
//! Computes a bounded refund amount from an operator selection and
//! validates it against the order's remaining refundable balance.
//!
//! ## Selection Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items       [{order_item_id, quantity}]  → Σ unit_price × quantity     │
//! │  full_order  every item at remaining qty  → remaining balance           │
//! │  manual      "12.50"                      → supersedes both amounts     │
//! │                                                                         │
//! │  Validation order (first failure wins):                                 │
//! │    1. NoSelection                                                       │
//! │    2. InvalidAmount                                                     │
//! │    -  UnknownItem / QuantityOutOfRange                                  │
//! │    3. ExceedsRemaining                                                  │
//! │    4. NotPositive                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Item quantities are cumulative: an item refunded in an earlier
//! succeeded refund only has its remaining quantity left to select.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Order, OrderDetail};

// =============================================================================
// Selection
// =============================================================================

/// One `{order_item_id, quantity}` pair picked by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundLineSelection {
    pub order_item_id: String,
    pub quantity: i64,
}

/// What the operator asked to refund.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundSelection {
    #[serde(default)]
    pub items: Vec<RefundLineSelection>,
    #[serde(default)]
    pub full_order: bool,
    /// Raw text from the amount field. Blank counts as absent.
    #[serde(default)]
    pub manual_amount: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RefundSelection {
    /// Selects individual items.
    pub fn items<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        RefundSelection {
            items: lines
                .into_iter()
                .map(|(id, quantity)| RefundLineSelection {
                    order_item_id: id.into(),
                    quantity,
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Selects every item at its remaining quantity.
    pub fn full_order() -> Self {
        RefundSelection {
            full_order: true,
            ..Default::default()
        }
    }

    /// Refunds a manually entered amount.
    pub fn manual(amount: impl Into<String>) -> Self {
        RefundSelection {
            manual_amount: Some(amount.into()),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_manual_amount(mut self, amount: impl Into<String>) -> Self {
        self.manual_amount = Some(amount.into());
        self
    }

    fn manual_text(&self) -> Option<&str> {
        self.manual_amount
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    fn selected_lines(&self) -> impl Iterator<Item = &RefundLineSelection> {
        self.items.iter().filter(|line| line.quantity != 0)
    }
}

// =============================================================================
// Plan
// =============================================================================

/// One line of a validated refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlannedRefundItem {
    pub order_item_id: String,
    pub quantity: i64,
    pub amount_cents: i64,
    pub description: String,
}

/// A validated refund, ready to submit to the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundPlan {
    /// Final amount to submit.
    pub amount_cents: i64,
    /// Σ of the per-item amounts (or the remaining balance for a full order).
    pub computed_cents: i64,
    /// True when a manual amount superseded the computed one.
    pub manual_override: bool,
    pub items: Vec<PlannedRefundItem>,
    pub reason: Option<String>,
}

impl RefundPlan {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Why a refund selection was rejected before submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundRejection {
    #[error("Select items, the full order, or enter an amount to refund")]
    NoSelection,

    #[error("Invalid amount {input:?}: enter a non-negative number")]
    InvalidAmount { input: String },

    #[error("Order item {order_item_id} is not part of this order")]
    UnknownItem { order_item_id: String },

    #[error("Quantity {requested} for item {order_item_id} must be between 1 and {remaining}")]
    QuantityOutOfRange {
        order_item_id: String,
        requested: i64,
        remaining: i64,
    },

    #[error("Refund of {requested} exceeds remaining balance of {remaining}")]
    ExceedsRemaining { requested: Money, remaining: Money },

    #[error("Refund amount must be positive")]
    NotPositive,
}

/// Returns true when a refund can be offered for the order.
///
/// Requires a payment reference, a positive remaining balance and a paid
/// payment status.
pub fn can_refund(order: &Order) -> bool {
    order.payment_reference().is_some()
        && order.remaining_refundable().is_positive()
        && order.payment_status.is_paid()
}

/// Computes and validates a refund for `detail`.
///
/// ## Example
/// ```rust,ignore
/// let plan = plan_refund(&detail, &RefundSelection::items([("item-1", 2)]))?;
/// assert_eq!(plan.amount_cents, 4000);
/// ```
pub fn plan_refund(
    detail: &OrderDetail,
    selection: &RefundSelection,
) -> Result<RefundPlan, RefundRejection> {
    let manual_text = selection.manual_text();

    // 1. Something must be selected
    if !selection.full_order && selection.selected_lines().next().is_none() && manual_text.is_none()
    {
        return Err(RefundRejection::NoSelection);
    }

    // 2. Manual amount parses as a non-negative decimal
    let manual = match manual_text {
        Some(text) => match Money::parse_decimal(text) {
            Ok(amount) if !amount.is_negative() => Some(amount),
            _ => {
                return Err(RefundRejection::InvalidAmount {
                    input: text.to_string(),
                })
            }
        },
        None => None,
    };

    let remaining = detail.order.remaining_refundable();

    let items = if selection.full_order {
        full_order_items(detail)
    } else {
        selected_items(detail, selection)?
    };

    let computed = if selection.full_order {
        remaining
    } else {
        items.iter().map(|item| Money::from_cents(item.amount_cents)).sum()
    };
    let amount = manual.unwrap_or(computed);

    // 3. Bounded by the remaining balance
    if amount > remaining {
        return Err(RefundRejection::ExceedsRemaining {
            requested: amount,
            remaining,
        });
    }

    // 4. Positive
    if !amount.is_positive() {
        return Err(RefundRejection::NotPositive);
    }

    Ok(RefundPlan {
        amount_cents: amount.cents(),
        computed_cents: computed.cents(),
        manual_override: manual.is_some(),
        items,
        reason: selection
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
}

fn full_order_items(detail: &OrderDetail) -> Vec<PlannedRefundItem> {
    detail
        .items
        .iter()
        .filter_map(|item| {
            let quantity = detail.remaining_quantity(&item.id);
            (quantity > 0).then(|| PlannedRefundItem {
                order_item_id: item.id.clone(),
                quantity,
                amount_cents: item.unit_price().multiply_quantity(quantity).cents(),
                description: item.name.clone(),
            })
        })
        .collect()
}

fn selected_items(
    detail: &OrderDetail,
    selection: &RefundSelection,
) -> Result<Vec<PlannedRefundItem>, RefundRejection> {
    let mut requested: HashMap<&str, i64> = HashMap::new();
    let mut planned = Vec::new();

    for line in selection.selected_lines() {
        let item = detail
            .item(&line.order_item_id)
            .ok_or_else(|| RefundRejection::UnknownItem {
                order_item_id: line.order_item_id.clone(),
            })?;

        let remaining = detail.remaining_quantity(&item.id);
        let so_far = requested.entry(item.id.as_str()).or_insert(0);
        *so_far += line.quantity;

        if line.quantity < 1 || *so_far > remaining {
            return Err(RefundRejection::QuantityOutOfRange {
                order_item_id: item.id.clone(),
                requested: *so_far,
                remaining,
            });
        }

        planned.push(PlannedRefundItem {
            order_item_id: item.id.clone(),
            quantity: line.quantity,
            amount_cents: item.unit_price().multiply_quantity(line.quantity).cents(),
            description: item.name.clone(),
        });
    }

    Ok(planned)
}

// =============================================================================
// Unit Tests
// =============================================================================
