//! # apoticare-core: Pure Stock Ledger Logic
//!
//! Every rule of the pharmacy stock ledger that can be expressed without I/O:
//! FEFO planning, return eligibility, session rules, forecast arithmetic and
//! alert classification.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ApotiCare Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Presentation layer (out of scope)                │   │
//! │  │     Counter ──► Returns ──► Inventory ──► Forecast / Alerts     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apoticare-db engines                         │   │
//! │  │   AllocationEngine, ReturnEngine, ReconciliationEngine, ...     │   │
//! │  │   transactions, repositories, SQLite                            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ apoticare-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │  fefo   │ │ returns │ │ reconcil.│ │forecast│  │   │
//! │  │   │  Lot    │ │  plan   │ │ decide  │ │ complete │ │ alerts │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain snapshots (Medication, Lot, Sale, sessions, movements)
//! - [`money`] - Integer cents
//! - [`error`] - Domain error types and the caller-facing [`ErrorKind`]
//! - [`validation`] - Input validation
//! - [`clock`] - Injectable "now"
//! - [`fefo`] - FEFO ordering and the allocation planner
//! - [`returns`] - Over-return checks and reintegration decisions
//! - [`reconciliation`] - Session state checks and regularization planning
//! - [`orders`] - Purchase order transitions and reception planning
//! - [`forecast`] - Consumption, depletion and reorder arithmetic
//! - [`alerts`] - Low-stock and expiration classification
//!
//! ## Example Usage
//!
//! ```rust
//! use apoticare_core::forecast::{predict, ForecastSettings};
//! use apoticare_core::types::{Medication, UrgencyLevel};
//! use chrono::{NaiveDate, Utc};
//!
//! let medication = Medication {
//!     id: 1,
//!     commercial_name: "Doliprane 1000mg".to_string(),
//!     active_ingredient: "Paracetamol".to_string(),
//!     reorder_threshold: 20,
//!     unit_price_cents: 215,
//!     prescription_required: false,
//!     is_active: true,
//!     created_at: Utc::now(),
//! };
//! let today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
//!
//! // 30 vendable, 270 sold over 90 days
//! let p = predict(&medication, 30, 270, 90, today, &ForecastSettings::default());
//! assert_eq!(p.days_remaining, Some(10.0));
//! assert_eq!(p.suggested_reorder_quantity, 60);
//! assert_eq!(p.urgency, UrgencyLevel::Urgent);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod clock;
pub mod error;
pub mod fefo;
pub mod forecast;
pub mod money;
pub mod orders;
pub mod reconciliation;
pub mod returns;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::Clock;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum request lines in a single sale.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum lines on a purchase order.
pub const MAX_ORDER_LINES: usize = 200;

/// Maximum units on one sale or return line.
///
/// Catches typing 1000 instead of 10 at the counter.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Maximum length of notes and comments.
pub const MAX_NOTE_LENGTH: usize = 500;
