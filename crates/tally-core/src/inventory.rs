//! # Stock Math
//!
//! Pure quantity rules for the inventory ledger and the bulk stock editor.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AdjustmentRequest ──validate──► ledger entry ──► batch update          │
//! │                                  (phase 1)        (phase 2)             │
//! │                                                                         │
//! │  new_actual    = max(0, actual    + delta)                              │
//! │  new_available = max(0, available + delta)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bulk editor keeps only target quantities; deltas are derived at save
//! time as `target - original`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::AdjustmentType;
use crate::validation::{
    validate_adjustment_delta, validate_note, validate_reason_code, ValidationResult,
};

/// Applies a signed delta, clamping at zero.
///
/// ## Example
/// ```rust
/// use tally_core::inventory::apply_delta;
///
/// assert_eq!(apply_delta(5, -8), 0);
/// assert_eq!(apply_delta(5, 3), 8);
/// ```
#[inline]
pub fn apply_delta(current: i64, delta: i64) -> i64 {
    current.saturating_add(delta).max(0)
}

// =============================================================================
// Adjustment Request
// =============================================================================

/// A single signed adjustment against one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentRequest {
    pub batch_id: String,
    pub delta: i64,
    pub adjustment_type: AdjustmentType,
    pub reason_code: String,
    pub notes: Option<String>,
}

impl AdjustmentRequest {
    /// Checks the request before anything is written and returns the
    /// normalised notes.
    pub fn validate(&self, allowed_reason_codes: &[String]) -> ValidationResult<Option<String>> {
        if self.batch_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "batch_id".to_string(),
            });
        }
        validate_adjustment_delta(self.delta)?;
        validate_reason_code(&self.reason_code, allowed_reason_codes)?;
        validate_note(self.notes.as_deref())
    }
}

// =============================================================================
// Bulk Stock Edit
// =============================================================================

/// One changed product in a bulk edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: String,
    pub original: i64,
    pub target: i64,
}

impl StockChange {
    #[inline]
    pub fn delta(&self) -> i64 {
        self.target - self.original
    }
}

/// Target quantities the operator typed, keyed by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkStockEdit {
    original: BTreeMap<String, i64>,
    target: BTreeMap<String, i64>,
}

impl BulkStockEdit {
    /// Starts an edit from the quantities currently on screen.
    pub fn new<I, S>(original: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        BulkStockEdit {
            original: original.into_iter().map(|(id, q)| (id.into(), q)).collect(),
            target: BTreeMap::new(),
        }
    }

    /// Records the operator's target for a product.
    pub fn set_target(&mut self, product_id: impl Into<String>, quantity: i64) {
        self.target.insert(product_id.into(), quantity);
    }

    pub fn target(&self, product_id: &str) -> Option<i64> {
        self.target
            .get(product_id)
            .or_else(|| self.original.get(product_id))
            .copied()
    }

    /// Products whose target differs from the original, in product-id order.
    ///
    /// A product edited without a known original is treated as starting at 0.
    pub fn changes(&self) -> Vec<StockChange> {
        self.target
            .iter()
            .filter_map(|(product_id, target)| {
                let original = self.original.get(product_id).copied().unwrap_or(0);
                (original != *target).then(|| StockChange {
                    product_id: product_id.clone(),
                    original,
                    target: *target,
                })
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes().is_empty()
    }
}

// =============================================================================
// Bulk Save Report
// =============================================================================

/// A product whose update failed during a bulk save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkFailure {
    pub product_id: String,
    pub message: String,
}

/// Per-product outcome of a bulk save. Never all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkSaveReport {
    pub updated: Vec<String>,
    pub failures: Vec<BulkFailure>,
}

impl BulkSaveReport {
    pub fn record_success(&mut self, product_id: impl Into<String>) {
        self.updated.push(product_id.into());
    }

    pub fn record_failure(&mut self, product_id: impl Into<String>, message: impl Into<String>) {
        self.failures.push(BulkFailure {
            product_id: product_id.into(),
            message: message.into(),
        });
    }

    pub fn succeeded(&self) -> usize {
        self.updated.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line per outcome group, e.g. `updated 2; failed: p-3 (not found)`.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BulkSaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "updated {}", self.succeeded())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { "; failed: " } else { ", " };
            write!(f, "{}{} ({})", sep, failure.product_id, failure.message)?;
        }
        Ok(())
    }
}
