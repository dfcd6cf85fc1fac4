//! # tally-core: Pure Fulfillment Logic for Tally
//!
//! This crate holds the rules of the order fulfillment and money
//! reconciliation core as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Operations Console (UI)                      │   │
//! │  │   Order Detail ──► Refund Panel ──► Shipping Panel ──► Stock    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-ops (services)                         │   │
//! │  │   orchestrator, refunds, labels, status, ledger                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │   │  money  │ │ refund  │ │ status  │ │ shipment │ │inventory│ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, Refund, Shipment, InventoryBatch, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//! - [`status`] - Order status machine
//! - [`refund`] - Refund amount planning
//! - [`shipment`] - Shipment label guards
//! - [`inventory`] - Stock clamping and bulk edit tracking
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//!
//! // Two units at $20.00 each
//! let unit_price = Money::from_cents(2000);
//! assert_eq!(unit_price.multiply_quantity(2).cents(), 4000);
//!
//! // Operator-entered amounts are parsed without floats
//! let manual = Money::parse_decimal("12.50").unwrap();
//! assert_eq!(manual.cents(), 1250);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod inventory;
pub mod money;
pub mod refund;
pub mod shipment;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use refund::{RefundPlan, RefundRejection, RefundSelection};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of an operator note (status history, adjustments, refunds).
pub const MAX_NOTE_LENGTH: usize = 500;

/// Reason codes accepted for inventory adjustments when no allow-list is
/// configured.
pub const DEFAULT_REASON_CODES: &[&str] = &[
    "cycle_count",
    "damaged_in_warehouse",
    "damaged_in_transit",
    "lost",
    "expired",
    "customer_return",
    "supplier_error",
    "data_entry_correction",
];

/// Currency code sent to the payment processor when none is configured.
pub const DEFAULT_CURRENCY: &str = "usd";
