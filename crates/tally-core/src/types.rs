//! # Domain Types
//!
//! Core domain types of the fulfillment and reconciliation core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │     Refund      │   │    Shipment     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  order_number   │   │  order_id (FK)  │   │  order_id (FK)  │       │
//! │  │  status         │   │  amount_cents   │   │  label_id       │       │
//! │  │  total_cents    │   │  items[]        │   │  voided         │       │
//! │  │  refunded_total │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ InventoryBatch  │   │ InventoryAdjust │   │ StatusHistory   │       │
//! │  │  qty_actual     │◄──│  quantity_delta │   │  from → to      │       │
//! │  │  qty_available  │   │  reason_code    │   │  actor, note    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary columns are `*_cents: i64`; use the `Money` accessors for math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Actor
// =============================================================================

/// The admin user performing a mutating action.
///
/// Passed explicitly into every mutating call and recorded for attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActorId(String);

impl ActorId {
    /// Creates an actor id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "actor".to_string(),
            });
        }
        Ok(ActorId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Checkout finished, payment not yet captured.
    PendingPayment,
    /// Paid and being fulfilled.
    Processing,
    /// Paused by an operator.
    OnHold,
    /// Shipped or picked up.
    Completed,
    /// Cancelled by the customer or an operator.
    Cancelled,
    /// Money returned to the customer.
    Refunded,
    /// Payment or fulfillment failed.
    Failed,
}

impl OrderStatus {
    /// Every status, in display order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingPayment,
        OrderStatus::Processing,
        OrderStatus::OnHold,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: OrderStatus::ALL.iter().map(|s| s.to_string()).collect(),
            })
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Payment state of an order, overlapping with [`OrderStatus`].
///
/// Gates refund eligibility: only paid orders can be refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    PartiallyRefunded,
    Refunded,
    Failed,
}

impl PaymentStatus {
    /// Returns true when captured funds remain with the merchant.
    pub const fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PartiallyRefunded)
    }

    /// Payment status after the refunded total changed.
    ///
    /// Only paid states move; an unpaid or failed order keeps its status.
    pub fn after_refund(self, refunded_total: Money, total: Money) -> PaymentStatus {
        if !self.is_paid() && self != PaymentStatus::Refunded {
            return self;
        }
        if refunded_total >= total && total.is_positive() {
            PaymentStatus::Refunded
        } else if refunded_total.is_positive() {
            PaymentStatus::PartiallyRefunded
        } else {
            PaymentStatus::Paid
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// An order header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-readable order number shown to customers.
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Sum of succeeded refunds, maintained by the store.
    pub refunded_total_cents: i64,
    /// Opaque payment-intent identifier at the processor.
    pub payment_reference: Option<String>,
    pub customer_email: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn refunded_total(&self) -> Money {
        Money::from_cents(self.refunded_total_cents)
    }

    /// `total - refunded_total`, never below zero.
    pub fn remaining_refundable(&self) -> Money {
        (self.total() - self.refunded_total()).clamp_non_negative()
    }

    /// Returns the payment reference when present and non-blank.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference
            .as_deref()
            .filter(|reference| !reference.trim().is_empty())
    }
}

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of order (frozen).
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// One row of the append-only status trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub order_id: String,
    /// None for the entry written at checkout.
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub note: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Refunds
// =============================================================================

/// Lifecycle of a refund at the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

/// A refund issued against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub status: RefundStatus,
    /// Refund id assigned by the payment processor.
    pub external_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<RefundItem>,
}

impl Refund {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn is_succeeded(&self) -> bool {
        self.status == RefundStatus::Succeeded
    }
}

/// Per-line-item portion of a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RefundItem {
    pub id: String,
    pub refund_id: String,
    pub order_item_id: String,
    pub quantity: i64,
    pub amount_cents: i64,
    pub description: Option<String>,
}

// =============================================================================
// Order Detail (aggregate read)
// =============================================================================

/// An order with its items, status trail and refunds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<StatusHistoryEntry>,
    pub refunds: Vec<Refund>,
}

impl OrderDetail {
    pub fn item(&self, order_item_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == order_item_id)
    }

    /// Quantity of an item already refunded by succeeded refunds.
    pub fn refunded_quantity(&self, order_item_id: &str) -> i64 {
        self.refunds
            .iter()
            .filter(|refund| refund.is_succeeded())
            .flat_map(|refund| refund.items.iter())
            .filter(|item| item.order_item_id == order_item_id)
            .map(|item| item.quantity)
            .sum()
    }

    /// Quantity of an item still available to refund.
    pub fn remaining_quantity(&self, order_item_id: &str) -> i64 {
        self.item(order_item_id)
            .map(|item| (item.quantity - self.refunded_quantity(order_item_id)).max(0))
            .unwrap_or(0)
    }

    /// Sum of succeeded refund amounts, recomputed from the refund rows.
    pub fn succeeded_refund_total(&self) -> Money {
        self.refunds
            .iter()
            .filter(|refund| refund.is_succeeded())
            .map(Refund::amount)
            .sum()
    }
}

// =============================================================================
// Shipments
// =============================================================================

/// Carrier-side state of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    LabelCreated,
    InTransit,
    Delivered,
    Voided,
}

/// A shipment row. The latest row per order is the active shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shipment {
    pub id: String,
    pub order_id: String,
    pub label_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_code: String,
    pub service_code: String,
    pub label_url: Option<String>,
    pub cost_cents: i64,
    pub status: ShipmentStatus,
    pub voided: bool,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }
}

/// A carrier tracking event. Read-only, owned by the carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrackingEvent {
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    pub status: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

// =============================================================================
// Pickup
// =============================================================================

/// State of an in-store pickup reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Scheduled,
    PickedUp,
    Cancelled,
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickupStatus::Scheduled => write!(f, "scheduled"),
            PickupStatus::PickedUp => write!(f, "picked_up"),
            PickupStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A pickup reservation for the pickup-fulfillment variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PickupReservation {
    pub id: String,
    pub order_id: String,
    pub status: PickupStatus,
    #[ts(as = "String")]
    pub scheduled_for: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub picked_up_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Inventory
// =============================================================================

/// Kind of an inventory adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Loss,
    Damage,
    Correction,
    Count,
    Return,
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentType::Loss => write!(f, "loss"),
            AdjustmentType::Damage => write!(f, "damage"),
            AdjustmentType::Correction => write!(f, "correction"),
            AdjustmentType::Count => write!(f, "count"),
            AdjustmentType::Return => write!(f, "return"),
        }
    }
}

/// A stock batch with actual and available quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryBatch {
    pub id: String,
    pub product_id: String,
    pub quantity_actual: i64,
    pub quantity_available: i64,
    pub low_stock_threshold: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Returns true when available stock is at or below the threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity_available <= self.low_stock_threshold
    }
}

/// Product-level stock, edited by the bulk stock screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductStock {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// An immutable ledger entry explaining a stock change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryAdjustment {
    pub id: String,
    pub batch_id: String,
    /// Signed change; never zero.
    pub quantity_delta: i64,
    pub adjustment_type: AdjustmentType,
    pub reason_code: String,
    pub notes: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
