//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │  refund::RefundRejection - Refund validation outcomes                  │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-ops errors                                                       │
//! │  └── OpsError / PanelError - What the console sees                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{OrderStatus, PickupStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested status equals the current one.
    ///
    /// ## When This Occurs
    /// - Operator re-submits the status the order already has
    /// - A second tab applies the same transition first
    #[error("Order is already {status}")]
    SameStatus { status: OrderStatus },

    /// The transition is not offered from the current status.
    #[error("Cannot move order from {from} to {to}")]
    TransitionNotAllowed { from: OrderStatus, to: OrderStatus },

    /// Cancel is not offered for cancelled, completed or refunded orders.
    #[error("Order in status {status} cannot be cancelled")]
    CancelNotAllowed { status: OrderStatus },

    /// Pickup completion requires a scheduled reservation.
    #[error("Pickup reservation {reservation_id} is {status}, expected scheduled")]
    PickupNotScheduled {
        reservation_id: String,
        status: PickupStatus,
    },

    /// The reservation belongs to a different order.
    #[error("Pickup reservation {reservation_id} does not belong to order {order_id}")]
    PickupOrderMismatch {
        reservation_id: String,
        order_id: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
/// They are raised before any network or database call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
