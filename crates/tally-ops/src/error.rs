//! # Service Error Types
//!
//! Errors returned by the fulfillment services, and the panel-scoped form
//! the console renders.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ops Error Categories                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │    Lookup       │  │   External Service      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  NotFound       │  │  Carrier {code,message} │ │
//! │  │  Core           │  │  Conflict       │  │  Payment {code,message} │ │
//! │  │  Rejected       │  │                 │  │  Transport (retryable)  │ │
//! │  │  *NotAllowed    │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────┐  ┌─────────────────────────────┐ │
//! │  │   Partial Failure (two-phase)   │  │   Store / Config            │ │
//! │  │                                 │  │                             │ │
//! │  │  LedgerWrite                    │  │  Store(DbError)             │ │
//! │  │  StockNotUpdated                │  │  Config(ConfigError)        │ │
//! │  │  LabelNotRecorded               │  │                             │ │
//! │  │  VoidNotRecorded                │  │                             │ │
//! │  │  RefundNotRecorded              │  │                             │ │
//! │  └─────────────────────────────────┘  └─────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate retries automatically. `is_retryable()` tells the
//! console whether offering a manual retry makes sense.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use tally_core::{CoreError, RefundRejection, ValidationError};
use tally_db::DbError;

/// Result type alias for service operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Service error type covering every failure a console action can hit.
#[derive(Debug, Error)]
pub enum OpsError {
    // =========================================================================
    // Validation Errors (nothing attempted)
    // =========================================================================
    /// Operator input failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A business rule refused the action.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// The refund selection was rejected before submission.
    #[error("{0}")]
    Rejected(#[from] RefundRejection),

    /// A new label is not allowed while an active label exists.
    #[error("Order {order_id} already has an active shipping label")]
    LabelNotAllowed { order_id: String },

    /// The label is not the order's active, unvoided label.
    #[error("Label {label_id} cannot be voided")]
    VoidNotAllowed { label_id: String },

    /// The order cannot be refunded (no payment, nothing left, or unpaid).
    #[error("Order {order_id} cannot be refunded: {reason}")]
    RefundNotAllowed { order_id: String, reason: String },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// The entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The entity changed since it was read.
    #[error("{entity} {id} changed before the update was applied: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    // =========================================================================
    // External Service Errors
    // =========================================================================
    /// The carrier label service answered with a structured error.
    #[error("Carrier error [{code}]: {message}")]
    Carrier {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The payment processor answered with a structured error.
    #[error("Payment error [{code}]: {message}")]
    Payment { code: String, message: String },

    /// The request never produced a usable answer (connection, decoding).
    #[error("{service} unreachable: {message}")]
    Transport { service: String, message: String },

    // =========================================================================
    // Partial Failures (two-phase writes)
    // =========================================================================
    /// Phase one of an adjustment failed; stock was not touched.
    #[error("Adjustment for batch {batch_id} was not logged: {reason}")]
    LedgerWrite { batch_id: String, reason: String },

    /// The ledger entry exists but the batch quantities were not updated.
    #[error("Adjustment {adjustment_id} logged but stock not updated: {reason}")]
    StockNotUpdated {
        adjustment_id: String,
        batch_id: String,
        reason: String,
    },

    /// The carrier sold a label that could not be decoded or saved.
    #[error("Label {label_id} was purchased but not recorded: {reason}")]
    LabelNotRecorded { label_id: String, reason: String },

    /// The carrier voided a label that could not be marked voided.
    #[error("Label {label_id} was voided by the carrier but not recorded: {reason}")]
    VoidNotRecorded { label_id: String, reason: String },

    /// The processor accepted a refund that could not be saved.
    #[error("Refund {external_id} was issued but not recorded: {reason}")]
    RefundNotRecorded { external_id: String, reason: String },

    // =========================================================================
    // Store / Configuration Errors
    // =========================================================================
    /// Backing store failure.
    #[error("Store error: {0}")]
    Store(DbError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Broad classes of [`OpsError`], used to pick how the console reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    ExternalService,
    PartialFailure,
    Store,
    Config,
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Lookup outcomes keep their meaning; everything else stays a store error.
impl From<DbError> for OpsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => OpsError::NotFound { entity, id },
            DbError::Conflict { entity, id, reason } => OpsError::Conflict { entity, id, reason },
            other => OpsError::Store(other),
        }
    }
}

impl OpsError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        OpsError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Transport error for a named external service.
    pub fn transport(service: &str, err: impl std::fmt::Display) -> Self {
        OpsError::Transport {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OpsError::Validation(_)
            | OpsError::Core(_)
            | OpsError::Rejected(_)
            | OpsError::LabelNotAllowed { .. }
            | OpsError::VoidNotAllowed { .. }
            | OpsError::RefundNotAllowed { .. } => ErrorCategory::Validation,
            OpsError::NotFound { .. } => ErrorCategory::NotFound,
            OpsError::Conflict { .. } => ErrorCategory::Conflict,
            OpsError::Carrier { .. } | OpsError::Payment { .. } | OpsError::Transport { .. } => {
                ErrorCategory::ExternalService
            }
            OpsError::LedgerWrite { .. }
            | OpsError::StockNotUpdated { .. }
            | OpsError::LabelNotRecorded { .. }
            | OpsError::VoidNotRecorded { .. }
            | OpsError::RefundNotRecorded { .. } => ErrorCategory::PartialFailure,
            OpsError::Store(_) => ErrorCategory::Store,
            OpsError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Returns true if re-clicking the action could succeed unchanged.
    ///
    /// Only transport failures qualify. Structured carrier and payment
    /// errors are answers, and partial failures need reconciliation first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OpsError::Transport { .. })
    }

    /// Returns true if the action wrote something and then failed.
    pub fn is_partial_failure(&self) -> bool {
        self.category() == ErrorCategory::PartialFailure
    }
}

// =============================================================================
// Panel Error
// =============================================================================

/// Error rendered inline in the panel that triggered the action.
///
/// ## Serialization
/// ```json
/// {
///   "code": "PAYMENT_ERROR",
///   "message": "Payment error [card_declined]: The card was declined",
///   "details": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message, shown verbatim
    pub message: String,

    /// Structured details from the external service, if any
    pub details: Option<serde_json::Value>,
}

/// Error codes for panel errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed
    ValidationError,

    /// The action is not offered in the current state
    NotAllowed,

    /// Entity not found
    NotFound,

    /// Entity changed since it was loaded
    Conflict,

    /// Carrier label service error
    CarrierError,

    /// Payment processor error
    PaymentError,

    /// External service unreachable
    ServiceUnavailable,

    /// Something was written and a later step failed
    PartialFailure,

    /// Backing store failure
    DatabaseError,

    /// Configuration problem
    ConfigError,
}

impl PanelError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        PanelError {
            code,
            message: message.into(),
            details: None,
        }
    }
}

/// Converts service errors to panel errors.
impl From<OpsError> for PanelError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::Validation(_) | OpsError::Rejected(_) => {
                PanelError::new(ErrorCode::ValidationError, err.to_string())
            }
            OpsError::Core(CoreError::Validation(e)) => {
                PanelError::new(ErrorCode::ValidationError, e.to_string())
            }
            OpsError::Core(_)
            | OpsError::LabelNotAllowed { .. }
            | OpsError::VoidNotAllowed { .. }
            | OpsError::RefundNotAllowed { .. } => {
                PanelError::new(ErrorCode::NotAllowed, err.to_string())
            }
            OpsError::NotFound { .. } => PanelError::new(ErrorCode::NotFound, err.to_string()),
            OpsError::Conflict { .. } => PanelError::new(
                ErrorCode::Conflict,
                format!("{}. Reload the order and try again.", err),
            ),
            OpsError::Carrier {
                ref code,
                ref message,
                ref details,
            } => PanelError {
                code: ErrorCode::CarrierError,
                message: format!("{} ({})", message, code),
                details: details.clone(),
            },
            OpsError::Payment { ref code, ref message } => {
                PanelError::new(ErrorCode::PaymentError, format!("{} ({})", message, code))
            }
            OpsError::Transport { .. } => {
                PanelError::new(ErrorCode::ServiceUnavailable, err.to_string())
            }
            OpsError::LedgerWrite { .. }
            | OpsError::StockNotUpdated { .. }
            | OpsError::LabelNotRecorded { .. }
            | OpsError::VoidNotRecorded { .. }
            | OpsError::RefundNotRecorded { .. } => {
                PanelError::new(ErrorCode::PartialFailure, err.to_string())
            }
            OpsError::Store(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Store operation failed: {}", e);
                PanelError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            OpsError::Config(e) => PanelError::new(ErrorCode::ConfigError, e.to_string()),
        }
    }
}

impl std::fmt::Display for PanelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for PanelError {}
