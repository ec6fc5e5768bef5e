//! # Error Types
//!
//! Domain-specific error types for apoticare-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  apoticare-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Malformed input                                │
//! │  └── ErrorKind        - Caller-facing category                         │
//! │                                                                         │
//! │  apoticare-db errors (separate crate)                                  │
//! │  ├── DbError          - Store unreachable / commit failed              │
//! │  └── LedgerError      - What every engine call returns                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → presentation layer  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (lot id, quantities, session or order id)
//! 3. Errors are enum variants, never String
//! 4. Every variant maps to exactly one [`ErrorKind`]

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Caller-facing error category.
///
/// The presentation layer switches on this instead of matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input: non-positive quantity, missing reason, over-return.
    Validation,
    /// FEFO allocation cannot satisfy a requested line.
    InsufficientStock,
    /// Operation invalid for the current state.
    State,
    /// Unknown medication, lot, sale or session.
    NotFound,
    /// Store unreachable or the atomic batch could not commit.
    Infrastructure,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is detected before the store is touched, or causes the
/// surrounding transaction to roll back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Medication id is unknown to the catalog.
    #[error("Medication not found: {0}")]
    MedicationNotFound(i64),

    /// Lot id is unknown.
    #[error("Lot not found: {0}")]
    LotNotFound(i64),

    /// Sale id is unknown.
    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    /// The sale exists but never drew from this lot.
    #[error("Sale {sale_id} has no line for lot {lot_id}")]
    SaleLineNotFound { sale_id: i64, lot_id: i64 },

    /// Inventory session id is unknown.
    #[error("Inventory session not found: {0}")]
    SessionNotFound(i64),

    /// Purchase order id is unknown.
    #[error("Purchase order not found: {0}")]
    OrderNotFound(i64),

    /// The reception names a line that belongs to no such order.
    #[error("Purchase order {order_id} has no line {line_id}")]
    OrderLineNotFound { order_id: i64, line_id: i64 },

    /// Not enough vendable stock to satisfy a requested line.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale request: DOLIPRANE × 40
    ///      │
    ///      ▼
    /// FEFO walk: L1 (5) + L2 (10) + L3 (20) = 35
    ///      │
    ///      ▼
    /// InsufficientStock { medication_id, available: 35, requested: 40 }
    ///      │
    ///      ▼
    /// No lot is touched, no sale is recorded
    /// ```
    #[error(
        "Insufficient stock for medication {medication_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        medication_id: i64,
        available: i64,
        requested: i64,
    },

    /// A lot mutation would leave a negative quantity on hand.
    #[error("Lot {lot_id} cannot go negative: on hand {on_hand}, change {delta}")]
    NegativeStock { lot_id: i64, on_hand: i64, delta: i64 },

    /// Another inventory session is already open.
    #[error("Inventory session {0} is already in progress")]
    SessionAlreadyInProgress(i64),

    /// The session is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Recording a count in a completed or cancelled session
    /// - Completing a session twice
    /// - Cancelling a completed session
    #[error("Inventory session {session_id} is {status}, cannot {operation}")]
    InvalidSessionStatus {
        session_id: i64,
        status: String,
        operation: &'static str,
    },

    /// The order is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Receiving a draft that was never sent to the supplier
    /// - Receiving or cancelling an order twice
    #[error("Purchase order {order_id} is {status}, cannot {operation}")]
    InvalidOrderStatus {
        order_id: i64,
        status: String,
        operation: &'static str,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns the caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::MedicationNotFound(_)
            | CoreError::LotNotFound(_)
            | CoreError::SaleNotFound(_)
            | CoreError::SaleLineNotFound { .. }
            | CoreError::SessionNotFound(_)
            | CoreError::OrderNotFound(_)
            | CoreError::OrderLineNotFound { .. } => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::NegativeStock { .. }
            | CoreError::SessionAlreadyInProgress(_)
            | CoreError::InvalidSessionStatus { .. }
            | CoreError::InvalidOrderStatus { .. } => ErrorKind::State,
            CoreError::Validation(_) => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any mutation; never touch the store.
#[derive(Debug, Error)]
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

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// A sale request carried no lines.
    #[error("A sale needs at least one line")]
    EmptySale,

    /// A purchase order carried no lines.
    #[error("An order needs at least one line")]
    EmptyOrder,

    /// The same order line was received twice in one reception.
    #[error("Order line {line_id} is listed more than once")]
    DuplicateOrderLine { line_id: i64 },

    /// A count with a nonzero variance arrived without a reason code.
    #[error("Lot {lot_id} has a variance of {variance} and needs a reason")]
    ReasonRequired { lot_id: i64, variance: i64 },

    /// A session cannot be completed while variances lack reasons.
    #[error("Variances without a reason on lots {lot_ids:?}")]
    UnexplainedVariances { lot_ids: Vec<i64> },

    /// A return would exceed what is left of the sale line.
    ///
    /// ## Example
    /// ```text
    /// Sold 7 from L2, already returned 5 → at most 2 more
    /// Request 3 → ReturnExceedsSold { remaining: 2, requested: 3 }
    /// ```
    #[error(
        "Return of {requested} exceeds remaining {remaining} for sale {sale_id}, lot {lot_id}"
    )]
    ReturnExceedsSold {
        sale_id: i64,
        lot_id: i64,
        remaining: i64,
        requested: i64,
    },

    /// Invalid format or inconsistent combination of values.
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            medication_id: 4,
            available: 35,
            requested: 40,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for medication 4: available 35, requested 40"
        );

        let err = ValidationError::ReasonRequired {
            lot_id: 9,
            variance: -2,
        };
        assert_eq!(err.to_string(), "Lot 9 has a variance of -2 and needs a reason");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CoreError::LotNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::SessionAlreadyInProgress(2).kind(),
            ErrorKind::State
        );
        assert_eq!(
            CoreError::NegativeStock {
                lot_id: 1,
                on_hand: 2,
                delta: -3
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(
            CoreError::InvalidOrderStatus {
                order_id: 3,
                status: "RECEIVED".to_string(),
                operation: "receive"
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(CoreError::OrderNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::from(ValidationError::EmptySale).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
