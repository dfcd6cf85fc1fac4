//! # Validation Module
//!
//! Input validation for the fulfillment core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Console form                                                 │
//! │  └── Disables submit on empty fields                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any network call)                        │
//! │  ├── zero-quantity adjustments                                         │
//! │  ├── reason codes outside the allow-list                               │
//! │  └── oversized notes                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (CHECK / FOREIGN KEY constraints)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_NOTE_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an optional operator note and returns it trimmed.
///
/// Blank notes become `None`.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_note;
///
/// assert_eq!(validate_note(Some("  ")).unwrap(), None);
/// assert_eq!(validate_note(Some(" mis-click ")).unwrap().as_deref(), Some("mis-click"));
/// assert!(validate_note(Some(&"x".repeat(600))).is_err());
/// ```
pub fn validate_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }

    Ok(Some(note.to_string()))
}

/// Validates a reason code against the configured allow-list.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_reason_code;
///
/// let allowed = vec!["lost".to_string(), "cycle_count".to_string()];
/// assert!(validate_reason_code("lost", &allowed).is_ok());
/// assert!(validate_reason_code("stolen", &allowed).is_err());
/// ```
pub fn validate_reason_code(code: &str, allowed: &[String]) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "reason_code".to_string(),
        });
    }

    if !allowed.iter().any(|a| a == code) {
        return Err(ValidationError::NotAllowed {
            field: "reason_code".to_string(),
            allowed: allowed.to_vec(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a signed adjustment quantity.
///
/// Zero-quantity adjustments are rejected before submission.
pub fn validate_adjustment_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a target stock quantity from the bulk editor.
pub fn validate_stock_target(target: i64) -> ValidationResult<()> {
    if target < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "stock quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a line quantity (>= 1).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a money amount in cents reported by an external service.
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_note() {
        assert_eq!(validate_note(None).unwrap(), None);
        assert_eq!(validate_note(Some("")).unwrap(), None);
        assert_eq!(validate_note(Some("ok")).unwrap(), Some("ok".to_string()));
        assert!(validate_note(Some(&"a".repeat(MAX_NOTE_LENGTH))).is_ok());
        assert!(validate_note(Some(&"a".repeat(MAX_NOTE_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_validate_reason_code() {
        let allowed: Vec<String> = crate::DEFAULT_REASON_CODES
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert!(validate_reason_code("cycle_count", &allowed).is_ok());
        assert!(matches!(
            validate_reason_code("", &allowed),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_reason_code("gift", &allowed),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_validate_adjustment_delta() {
        assert!(validate_adjustment_delta(-8).is_ok());
        assert!(validate_adjustment_delta(3).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
    }

    #[test]
    fn test_validate_stock_target() {
        assert!(validate_stock_target(0).is_ok());
        assert!(validate_stock_target(12).is_ok());
        assert!(validate_stock_target(-1).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
