//! # Validation Module
//!
//! Input validation for ledger commands.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation layer                                           │
//! │  └── Form checks, immediate feedback                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engines (Rust)                                               │
//! │  └── THIS MODULE: runs before any transaction is opened                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity_on_hand >= 0)                                     │
//! │  ├── UNIQUE (session_id, lot_id)                                       │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use apoticare_core::validation::{validate_quantity, validate_lot_number};
//!
//! validate_quantity(5).unwrap();
//! validate_lot_number("B-2024-117").unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{
    CountRequest, NewLot, NewMedication, NewPurchaseOrder, ReceptionRequest, ReturnRequest,
    SaleRequest, VarianceReason,
};
use crate::{MAX_LINE_QUANTITY, MAX_NOTE_LENGTH, MAX_ORDER_LINES, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a manufacturer lot number.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
pub fn validate_lot_number(lot_number: &str) -> ValidationResult<()> {
    required_text("lot_number", lot_number, 50)
}

/// Validates a medication name (commercial name or active ingredient).
///
/// ## Example
/// ```rust
/// use apoticare_core::validation::validate_medication_name;
///
/// assert!(validate_medication_name("commercial_name", "Doliprane 1000mg").is_ok());
/// assert!(validate_medication_name("commercial_name", "").is_err());
/// ```
pub fn validate_medication_name(field: &str, name: &str) -> ValidationResult<()> {
    required_text(field, name, 200)
}

/// Optional free text (notes, comments): only the length is checked.
pub fn validate_note(field: &str, note: Option<&str>) -> ValidationResult<()> {
    match note {
        Some(text) if text.chars().count() > MAX_NOTE_LENGTH => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LENGTH,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity moved by a sale or a return.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock level (physical count, received quantity). Zero is fine.
pub fn validate_stock_level(field: &str, qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Example
/// ```rust
/// use apoticare_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(345).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a window or threshold expressed in days.
pub fn validate_days(field: &str, days: i64) -> ValidationResult<()> {
    if days <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Command Validators
// =============================================================================

/// Validates a sale request before any lot is read.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Counter: Validate Sale                                                 │
/// │                                                                         │
/// │  lines empty?             → EmptySale                                  │
/// │  any quantity <= 0?       → MustBePositive                             │
/// │  too many lines?          → OutOfRange                                 │
/// │  notes too long?          → TooLong                                    │
/// │  OK → AllocationEngine opens the transaction                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_sale_request(request: &SaleRequest) -> ValidationResult<()> {
    if request.lines.is_empty() {
        return Err(ValidationError::EmptySale);
    }

    if request.lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "sale lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    for line in &request.lines {
        validate_quantity(line.quantity)?;
    }

    if let Some(number) = request.prescription_number.as_deref() {
        if !request.prescription {
            return Err(ValidationError::Invalid {
                field: "prescription_number".to_string(),
                reason: "given on a sale not flagged as prescription".to_string(),
            });
        }
        required_text("prescription_number", number, 50)?;
    }

    validate_note("notes", request.notes.as_deref())
}

/// Validates the shape of a return. Remaining-quantity checks need the sale
/// history and live in [`crate::returns`].
pub fn validate_return_request(request: &ReturnRequest) -> ValidationResult<()> {
    validate_quantity(request.quantity)?;
    validate_note("comment", request.comment.as_deref())
}

/// Validates a count and the reason rule for the variance it produces.
///
/// `theoretical` is the ledger quantity captured when the count is recorded.
pub fn validate_count(request: &CountRequest, theoretical: i64) -> ValidationResult<i64> {
    validate_stock_level("physical_quantity", request.physical_quantity)?;
    validate_note("comment", request.comment.as_deref())?;

    let variance = request.physical_quantity - theoretical;
    require_reason(request.lot_id, variance, request.reason)?;

    Ok(variance)
}

/// A nonzero variance needs a reason code.
pub fn require_reason(
    lot_id: i64,
    variance: i64,
    reason: Option<VarianceReason>,
) -> ValidationResult<()> {
    if variance != 0 && reason.is_none() {
        return Err(ValidationError::ReasonRequired { lot_id, variance });
    }

    Ok(())
}

pub fn validate_new_medication(medication: &NewMedication) -> ValidationResult<()> {
    validate_medication_name("commercial_name", &medication.commercial_name)?;
    validate_medication_name("active_ingredient", &medication.active_ingredient)?;
    if let Some(threshold) = medication.reorder_threshold {
        validate_stock_level("reorder_threshold", threshold)?;
    }
    validate_price_cents(medication.unit_price_cents)
}

pub fn validate_new_lot(lot: &NewLot) -> ValidationResult<()> {
    validate_lot_number(&lot.lot_number)?;
    validate_stock_level("quantity", lot.quantity)?;
    validate_price_cents(lot.purchase_price_cents)
}

/// Validates a draft order. Medication existence is checked by the engine.
pub fn validate_new_order(order: &NewPurchaseOrder) -> ValidationResult<()> {
    if order.lines.is_empty() {
        return Err(ValidationError::EmptyOrder);
    }

    if order.lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "order lines".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    for line in &order.lines {
        validate_quantity(line.quantity)?;
        validate_price_cents(line.unit_cost_cents)?;
    }

    validate_note("notes", order.notes.as_deref())
}

/// Validates the shape of a reception.
///
/// ## Rules
/// - Each order line at most once
/// - Lot numbers as for any lot, quantities not negative
/// - Something must have arrived
pub fn validate_reception(request: &ReceptionRequest) -> ValidationResult<()> {
    let mut seen = HashSet::new();

    for line in &request.lines {
        if !seen.insert(line.order_line_id) {
            return Err(ValidationError::DuplicateOrderLine {
                line_id: line.order_line_id,
            });
        }
        validate_lot_number(&line.lot_number)?;
        validate_stock_level("quantity", line.quantity)?;
    }

    if request.lines.iter().all(|line| line.quantity == 0) {
        return Err(ValidationError::Invalid {
            field: "lines".to_string(),
            reason: "nothing was received".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
