//! # Alert Classification
//!
//! Low-stock, near-expiration and expired-lot conditions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LOW STOCK  vendable < threshold                                        │
//! │    vendable == 0            → RUPTURE                                  │
//! │    vendable / threshold < ¼ → CRITIQUE                                 │
//! │    vendable / threshold < ½ → URGENT                                   │
//! │    otherwise                → ATTENTION                                │
//! │                                                                         │
//! │  EXPIRATION  unexpired lot with stock, expiring within the window       │
//! │    < 7 days  → CRITIQUE                                                │
//! │    < 14 days → URGENT                                                  │
//! │    otherwise → ATTENTION                                               │
//! │                                                                         │
//! │  EXPIRED  expiration < today and stock > 0 → destruction candidates    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Lot, Medication, NewMedication, UrgencyLevel};

// =============================================================================
// Settings
// =============================================================================

/// Alert tuning, normally loaded from the `[alerts]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub expiration_window_days: i64,
    /// Exclusive upper bound for `CRITIQUE`.
    pub critical_days: i64,
    /// Exclusive upper bound for `URGENT`.
    pub urgent_days: i64,
    /// Threshold given to a medication registered without one.
    pub default_low_stock_threshold: i64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            expiration_window_days: 90,
            critical_days: 7,
            urgent_days: 14,
            default_low_stock_threshold: 10,
        }
    }
}

// =============================================================================
// Alert Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockAlert {
    pub medication_id: i64,
    pub medication_name: String,
    pub vendable_stock: i64,
    pub threshold: i64,
    /// threshold − vendable.
    pub deficit: i64,
    pub urgency: UrgencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpirationAlert {
    pub lot_id: i64,
    pub lot_number: String,
    pub medication_id: i64,
    pub medication_name: String,
    #[ts(as = "String")]
    pub expiration_date: NaiveDate,
    pub days_remaining: i64,
    pub quantity_on_hand: i64,
    pub urgency: UrgencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpiredLot {
    pub lot_id: i64,
    pub lot_number: String,
    pub medication_id: i64,
    pub medication_name: String,
    #[ts(as = "String")]
    pub expiration_date: NaiveDate,
    pub days_expired: i64,
    pub quantity_on_hand: i64,
    /// Quantity × purchase price.
    pub value: Money,
}

// =============================================================================
// Classification
// =============================================================================

/// Threshold to store for a new catalog entry.
pub fn registration_threshold(medication: &NewMedication, settings: &AlertSettings) -> i64 {
    medication
        .reorder_threshold
        .unwrap_or(settings.default_low_stock_threshold)
}

/// Urgency of a stock shortfall. Caller ensures `vendable < threshold`.
pub fn low_stock_urgency(vendable: i64, threshold: i64) -> UrgencyLevel {
    if vendable <= 0 {
        return UrgencyLevel::Rupture;
    }
    let ratio = vendable as f64 / threshold.max(1) as f64;
    if ratio < 0.25 {
        UrgencyLevel::Critique
    } else if ratio < 0.5 {
        UrgencyLevel::Urgent
    } else {
        UrgencyLevel::Attention
    }
}

pub fn expiration_urgency(days_remaining: i64, settings: &AlertSettings) -> UrgencyLevel {
    if days_remaining < settings.critical_days {
        UrgencyLevel::Critique
    } else if days_remaining < settings.urgent_days {
        UrgencyLevel::Urgent
    } else {
        UrgencyLevel::Attention
    }
}

/// `None` unless vendable stock is below the medication's own threshold.
pub fn low_stock_alert(medication: &Medication, vendable: i64) -> Option<LowStockAlert> {
    let threshold = medication.reorder_threshold;
    if vendable >= threshold {
        return None;
    }
    Some(LowStockAlert {
        medication_id: medication.id,
        medication_name: medication.commercial_name.clone(),
        vendable_stock: vendable,
        threshold,
        deficit: threshold - vendable,
        urgency: low_stock_urgency(vendable, threshold),
    })
}

/// `None` unless the lot holds stock, is unexpired and expires within the window.
pub fn expiration_alert(
    lot: &Lot,
    medication_name: &str,
    window_days: i64,
    today: NaiveDate,
    settings: &AlertSettings,
) -> Option<ExpirationAlert> {
    let days = lot.days_until_expiration(today);
    if lot.quantity_on_hand <= 0 || days < 0 || days > window_days {
        return None;
    }
    Some(ExpirationAlert {
        lot_id: lot.id,
        lot_number: lot.lot_number.clone(),
        medication_id: lot.medication_id,
        medication_name: medication_name.to_string(),
        expiration_date: lot.expiration_date,
        days_remaining: days,
        quantity_on_hand: lot.quantity_on_hand,
        urgency: expiration_urgency(days, settings),
    })
}

/// `None` unless the lot is expired and still holds stock.
pub fn expired_lot(lot: &Lot, medication_name: &str, today: NaiveDate) -> Option<ExpiredLot> {
    if !lot.is_expired(today) || lot.quantity_on_hand <= 0 {
        return None;
    }
    Some(ExpiredLot {
        lot_id: lot.id,
        lot_number: lot.lot_number.clone(),
        medication_id: lot.medication_id,
        medication_name: medication_name.to_string(),
        expiration_date: lot.expiration_date,
        days_expired: -lot.days_until_expiration(today),
        quantity_on_hand: lot.quantity_on_hand,
        value: lot.stock_value(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
