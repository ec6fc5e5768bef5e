//! # Domain Types
//!
//! Value snapshots of the ledger entities. Repositories return these; engines
//! never mutate them in place, they issue commands inside a transaction.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Medication    │◄──│       Lot       │◄──│    SaleLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  threshold      │   │  expiration     │   │  sale_id (FK)   │       │
//! │  │  unit price     │   │  qty on hand    │   │  lot_id  (FK)   │       │
//! │  │  Rx flag        │   │  purchase price │   │  qty, price     │       │
//! │  └─────────────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │                                 │                     │                 │
//! │  ┌─────────────────┐   ┌────────┴────────┐   ┌────────┴────────┐       │
//! │  │ InventorySession│──►│   CountEntry    │   │   SaleReturn    │       │
//! │  │  IN_PROGRESS    │   │  theoretical    │   │  reason         │       │
//! │  │  COMPLETED      │   │  physical       │   │  reintegrated   │       │
//! │  │  CANCELLED      │   │  variance       │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  PurchaseOrder ──► OrderLine ──receive──► Lot (one per line)            │
//! │  StockMovement: append-only journal of every lot quantity change        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Ids are store-assigned, monotonically increasing integers. Ascending lot id
//! therefore means oldest-registered lot first, which FEFO uses as tie-breaker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Medication
// =============================================================================

/// A catalog entry. Read-only from the ledger's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Medication {
    pub id: i64,

    /// Name printed on the box (e.g. "Doliprane 1000mg").
    pub commercial_name: String,

    /// International nonproprietary name (e.g. "Paracetamol").
    pub active_ingredient: String,

    /// Vendable stock below this many units raises a low-stock alert.
    pub reorder_threshold: i64,

    /// Retail price in cents, applied to every sale line at sale time.
    pub unit_price_cents: i64,

    pub prescription_required: bool,

    /// Inactive medications are skipped by forecasting and alerts.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Medication {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Lot
// =============================================================================

/// One batch of a medication with its own expiration date and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Lot {
    pub id: i64,
    pub medication_id: i64,

    /// Manufacturer batch number.
    pub lot_number: String,

    #[ts(as = "String")]
    pub expiration_date: NaiveDate,

    /// Never negative.
    pub quantity_on_hand: i64,

    pub purchase_price_cents: i64,
    pub supplier_id: Option<i64>,

    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
}

impl Lot {
    /// A lot is expired once its expiration date lies strictly in the past.
    /// A lot expiring today can still be sold today.
    #[inline]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date < today
    }

    /// Unexpired and holding stock.
    #[inline]
    pub fn is_vendable(&self, today: NaiveDate) -> bool {
        self.quantity_on_hand > 0 && !self.is_expired(today)
    }

    /// Days until expiration; negative once expired.
    #[inline]
    pub fn days_until_expiration(&self, today: NaiveDate) -> i64 {
        (self.expiration_date - today).num_days()
    }

    /// Value of the remaining units at purchase price.
    #[inline]
    pub fn stock_value(&self) -> Money {
        Money::from_cents(self.purchase_price_cents).multiply_quantity(self.quantity_on_hand)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale header. Immutable: returns never edit the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,

    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,

    /// Σ line quantity × unit price, in cents.
    pub total_cents: i64,

    pub prescription: bool,
    pub prescription_number: Option<String>,
    pub seller_id: i64,
    pub notes: Option<String>,
}

impl Sale {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// One lot touched by a sale. A sale has one line per lot drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    pub lot_id: i64,
    pub medication_id: i64,
    pub quantity: i64,

    /// Catalog price frozen at sale time.
    pub unit_price_cents: i64,
}

impl SaleLine {
    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A sale header together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
}

impl SaleReceipt {
    /// Units drawn for one medication across all lines.
    pub fn quantity_for(&self, medication_id: i64) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.medication_id == medication_id)
            .map(|l| l.quantity)
            .sum()
    }
}

/// One requested `(medication, quantity)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub medication_id: i64,
    pub quantity: i64,
}

impl SaleLineRequest {
    pub fn new(medication_id: i64, quantity: i64) -> Self {
        SaleLineRequest {
            medication_id,
            quantity,
        }
    }
}

/// Everything needed to create a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub lines: Vec<SaleLineRequest>,
    pub seller_id: i64,
    pub prescription: bool,
    pub prescription_number: Option<String>,
    pub notes: Option<String>,
}

impl SaleRequest {
    /// Creates an over-the-counter sale request.
    pub fn new(lines: Vec<SaleLineRequest>, seller_id: i64) -> Self {
        SaleRequest {
            lines,
            seller_id,
            prescription: false,
            prescription_number: None,
            notes: None,
        }
    }

    /// Marks the sale as dispensed on prescription.
    pub fn with_prescription(mut self, number: Option<String>) -> Self {
        self.prescription = true;
        self.prescription_number = number;
        self
    }
}

// =============================================================================
// Returns
// =============================================================================

/// Why a customer brought units back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    PrescriptionError,
    AdverseReaction,
    TreatmentChange,
    NearExpiry,
    DamagedPackaging,
    ExcessQuantity,
    Other,
}

/// A recorded return against one (sale, lot) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReturn {
    pub id: i64,
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i64,
    pub reason: ReturnReason,

    /// True only when the units went back into the lot.
    pub reintegrated: bool,

    pub comment: Option<String>,
    pub user_id: i64,

    #[ts(as = "String")]
    pub returned_at: DateTime<Utc>,
}

/// Input for registering a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequest {
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i64,
    pub reason: ReturnReason,
    pub reintegrate: bool,
    pub comment: Option<String>,
    pub user_id: i64,
}

// =============================================================================
// Inventory Sessions
// =============================================================================

/// Lifecycle of a counting session.
///
/// ```text
/// NONE ──start──► IN_PROGRESS ──complete──► COMPLETED
///                      │
///                      └──────cancel──────► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Completed and cancelled sessions accept no further operation.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "IN_PROGRESS"),
            SessionStatus::Completed => write!(f, "COMPLETED"),
            SessionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventorySession {
    pub id: i64,

    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,

    pub status: SessionStatus,
    pub operator_id: i64,
    pub notes: Option<String>,
}

/// Why a physical count differs from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VarianceReason {
    Breakage,
    Theft,
    Expired,
    EntryError,
    SupplierDiscrepancy,
    Other,
}

/// One counted lot within a session. Re-counting overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CountEntry {
    pub id: i64,
    pub session_id: i64,
    pub lot_id: i64,

    /// Ledger quantity captured when the count was recorded.
    pub theoretical_quantity: i64,
    pub physical_quantity: i64,

    /// physical − theoretical.
    pub variance: i64,

    pub reason: Option<VarianceReason>,
    pub comment: Option<String>,

    #[ts(as = "String")]
    pub counted_at: DateTime<Utc>,
}

impl CountEntry {
    #[inline]
    pub fn has_variance(&self) -> bool {
        self.variance != 0
    }

    /// A nonzero variance without a reason blocks completion.
    #[inline]
    pub fn is_unexplained(&self) -> bool {
        self.has_variance() && self.reason.is_none()
    }
}

/// Input for recording a physical count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CountRequest {
    pub session_id: i64,
    pub lot_id: i64,
    pub physical_quantity: i64,
    pub reason: Option<VarianceReason>,
    pub comment: Option<String>,
}

/// Totals of a session, for the closing screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub session: InventorySession,
    pub entries_counted: i64,
    pub entries_with_variance: i64,
    pub unexplained_variances: i64,

    /// Σ variance over all entries.
    pub net_variance: i64,
}

// =============================================================================
// Stock Movements
// =============================================================================

/// What caused a lot quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Reception,
    Sale,
    Return,
    Regularization,
}

/// Journal row written in the same transaction as the change it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: i64,
    pub lot_id: i64,
    pub kind: MovementKind,

    /// Signed change applied to quantity on hand.
    pub delta: i64,
    pub quantity_after: i64,

    /// Sale, return, session or purchase order id, depending on `kind`.
    pub reference_id: Option<i64>,
    pub user_id: Option<i64>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Orders
// =============================================================================

/// Lifecycle of a supplier order.
///
/// ```text
/// DRAFT ──mark_ordered──► ORDERED ──receive_order──► RECEIVED
///   │                        │
///   └──────── cancel ────────┴──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Received | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Draft => write!(f, "DRAFT"),
            OrderStatus::Ordered => write!(f, "ORDERED"),
            OrderStatus::Received => write!(f, "RECEIVED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: i64,
    pub supplier_id: i64,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_by: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub ordered_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
}

/// One medication on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub medication_id: i64,
    pub quantity_ordered: i64,

    /// Zero until the order is received.
    pub quantity_received: i64,
    pub unit_cost_cents: i64,
}

impl OrderLine {
    /// Cost of the ordered quantity.
    pub fn ordered_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity_ordered)
    }
}

/// An order with its lines, as shown on the purchasing screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    pub order: PurchaseOrder,
    pub lines: Vec<OrderLine>,
}

/// Input for drafting an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchaseOrder {
    pub supplier_id: i64,
    pub lines: Vec<NewOrderLine>,
    pub notes: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrderLine {
    pub medication_id: i64,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

/// What arrived for one order line: the batch printed on the delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceivedLine {
    pub order_line_id: i64,
    pub lot_number: String,

    #[ts(as = "String")]
    pub expiration_date: NaiveDate,

    /// May differ from the quantity ordered. Zero means nothing arrived.
    pub quantity: i64,
}

/// Input for receiving an order. Order lines not listed receive nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceptionRequest {
    pub order_id: i64,
    pub lines: Vec<ReceivedLine>,
    pub user_id: i64,
}

/// Result of a reception: the closed order and the lots it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderReceipt {
    pub order: PurchaseOrder,
    pub lines: Vec<OrderLine>,
    pub lots: Vec<Lot>,
}

// =============================================================================
// Registration Inputs
// =============================================================================

/// New catalog entry (catalog management, seeding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedication {
    pub commercial_name: String,
    pub active_ingredient: String,
    /// `None` takes the configured default at registration.
    pub reorder_threshold: Option<i64>,
    pub unit_price_cents: i64,
    pub prescription_required: bool,
}

/// A received batch (purchasing, seeding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLot {
    pub medication_id: i64,
    pub lot_number: String,
    pub expiration_date: NaiveDate,
    pub quantity: i64,
    pub purchase_price_cents: i64,
    pub supplier_id: Option<i64>,
}

// =============================================================================
// Urgency Level
// =============================================================================

/// Severity shared by alerts and predictions.
///
/// Ordering is by severity: `Ok < Attention < Urgent < Critique < Rupture`.
/// Sort descending to list the most pressing items first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Ok,
    Attention,
    Urgent,
    Critique,
    Rupture,
}

impl UrgencyLevel {
    /// Tier for a number of days left against configured thresholds.
    ///
    /// `critical_days` and `urgent_days` are inclusive upper bounds.
    pub fn from_days(days: f64, critical_days: i64, urgent_days: i64) -> Self {
        if days <= critical_days as f64 {
            UrgencyLevel::Critique
        } else if days <= urgent_days as f64 {
            UrgencyLevel::Urgent
        } else {
            UrgencyLevel::Attention
        }
    }

    /// Label used in exports and logs.
    pub fn label(&self) -> &'static str {
        match self {
            UrgencyLevel::Ok => "OK",
            UrgencyLevel::Attention => "ATTENTION",
            UrgencyLevel::Urgent => "URGENT",
            UrgencyLevel::Critique => "CRITIQUE",
            UrgencyLevel::Rupture => "RUPTURE",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(expiration: NaiveDate, qty: i64) -> Lot {
        Lot {
            id: 1,
            medication_id: 1,
            lot_number: "B-001".to_string(),
            expiration_date: expiration,
            quantity_on_hand: qty,
            purchase_price_cents: 120,
            supplier_id: None,
            received_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_lot_expiry_boundary() {
        let today = date(2024, 3, 1);
        assert!(!lot(today, 5).is_expired(today));
        assert!(lot(date(2024, 2, 29), 5).is_expired(today));
        assert!(lot(today, 5).is_vendable(today));
        assert!(!lot(date(2024, 6, 1), 0).is_vendable(today));
    }

    #[test]
    fn test_days_until_expiration() {
        let today = date(2024, 3, 1);
        assert_eq!(lot(date(2024, 3, 11), 1).days_until_expiration(today), 10);
        assert_eq!(lot(date(2024, 2, 28), 1).days_until_expiration(today), -2);
    }

    #[test]
    fn test_stock_value() {
        assert_eq!(lot(date(2025, 1, 1), 10).stock_value().cents(), 1200);
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(UrgencyLevel::Rupture > UrgencyLevel::Critique);
        assert!(UrgencyLevel::Critique > UrgencyLevel::Urgent);
        assert!(UrgencyLevel::Urgent > UrgencyLevel::Attention);
        assert!(UrgencyLevel::Attention > UrgencyLevel::Ok);
    }

    #[test]
    fn test_urgency_from_days() {
        assert_eq!(UrgencyLevel::from_days(7.0, 7, 14), UrgencyLevel::Critique);
        assert_eq!(UrgencyLevel::from_days(7.5, 7, 14), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_days(14.0, 7, 14), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_days(30.0, 7, 14), UrgencyLevel::Attention);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&UrgencyLevel::Critique).unwrap(),
            "\"CRITIQUE\""
        );
        assert_eq!(
            serde_json::to_string(&ReturnReason::TreatmentChange).unwrap(),
            "\"treatment_change\""
        );

        let json = serde_json::to_value(lot(date(2024, 6, 1), 3)).unwrap();
        assert_eq!(json["expiration_date"], "2024-06-01");
        assert_eq!(json["quantity_on_hand"], 3);
    }

    #[test]
    fn test_order_status() {
        assert_eq!(OrderStatus::Ordered.to_string(), "ORDERED");
        assert_eq!(
            serde_json::to_string(&OrderStatus::Received).unwrap(),
            "\"RECEIVED\""
        );
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Draft.is_terminal());
    }

    #[test]
    fn test_session_status_display() {
        assert_eq!(SessionStatus::InProgress.to_string(), "IN_PROGRESS");
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
    }
}
