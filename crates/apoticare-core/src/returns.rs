//! # Return Rules
//!
//! Eligibility and reintegration decisions for customer returns.
//!
//! ```text
//! returnable = sold on (sale, lot) − Σ previously returned on (sale, lot)
//!
//! reintegrate requested? ──no──► write-off (NotRequested)
//!        │yes
//!        ▼
//! lot expired today? ──yes──► write-off (LotExpired), surfaced to caller
//!        │no
//!        ▼
//! credit the lot (depleted lots included)
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{Lot, SaleLine, SaleReturn};
use crate::validation::ValidationResult;

/// Why returned units were not put back on the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WriteOffCause {
    /// The caller asked for a write-off.
    NotRequested,
    /// Reintegration was asked for but the lot has expired.
    LotExpired,
}

/// Outcome of [`decide_reintegration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReintegrationDecision {
    pub reintegrate: bool,
    pub write_off_cause: Option<WriteOffCause>,
}

/// A stored return plus, when stock was not credited, the reason why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RegisteredReturn {
    pub record: SaleReturn,
    pub write_off_cause: Option<WriteOffCause>,
}

impl RegisteredReturn {
    /// True when the caller asked for reintegration and did not get it.
    pub fn was_downgraded(&self) -> bool {
        self.write_off_cause == Some(WriteOffCause::LotExpired)
    }
}

/// A sale line with what can still come back against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnableLine {
    pub line: SaleLine,
    pub returned: i64,
    pub remaining: i64,
    /// False once the lot has expired; returns would be written off.
    pub reintegrable: bool,
}

/// Units of a sale line not yet returned.
#[inline]
pub fn remaining_returnable(sold: i64, already_returned: i64) -> i64 {
    (sold - already_returned).max(0)
}

/// Rejects a return that would push Σ returned above the sold quantity.
pub fn check_return_quantity(
    sale_id: i64,
    lot_id: i64,
    sold: i64,
    already_returned: i64,
    requested: i64,
) -> ValidationResult<()> {
    let remaining = remaining_returnable(sold, already_returned);
    if requested > remaining {
        return Err(ValidationError::ReturnExceedsSold {
            sale_id,
            lot_id,
            remaining,
            requested,
        });
    }
    Ok(())
}

/// Decides whether returned units go back into the lot.
pub fn decide_reintegration(requested: bool, lot: &Lot, today: NaiveDate) -> ReintegrationDecision {
    if !requested {
        return ReintegrationDecision {
            reintegrate: false,
            write_off_cause: Some(WriteOffCause::NotRequested),
        };
    }

    if lot.is_expired(today) {
        return ReintegrationDecision {
            reintegrate: false,
            write_off_cause: Some(WriteOffCause::LotExpired),
        };
    }

    ReintegrationDecision {
        reintegrate: true,
        write_off_cause: None,
    }
}

/// Builds the returnable view of one sale line.
pub fn returnable_line(line: SaleLine, returned: i64, lot: &Lot, today: NaiveDate) -> ReturnableLine {
    let remaining = remaining_returnable(line.quantity, returned);
    ReturnableLine {
        line,
        returned,
        remaining,
        reintegrable: !lot.is_expired(today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(exp: NaiveDate, qty: i64) -> Lot {
        Lot {
            id: 2,
            medication_id: 1,
            lot_number: "L2".to_string(),
            expiration_date: exp,
            quantity_on_hand: qty,
            purchase_price_cents: 100,
            supplier_id: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_over_return_rejected() {
        assert!(check_return_quantity(1, 2, 7, 0, 7).is_ok());
        assert!(check_return_quantity(1, 2, 7, 5, 2).is_ok());

        let err = check_return_quantity(1, 2, 7, 5, 3).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ReturnExceedsSold {
                remaining: 2,
                requested: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_reintegration_decisions() {
        let today = date(2024, 1, 5);

        let fresh = decide_reintegration(true, &lot(date(2024, 2, 1), 3), today);
        assert!(fresh.reintegrate);
        assert_eq!(fresh.write_off_cause, None);

        let expired = decide_reintegration(true, &lot(date(2024, 1, 4), 3), today);
        assert!(!expired.reintegrate);
        assert_eq!(expired.write_off_cause, Some(WriteOffCause::LotExpired));

        let declined = decide_reintegration(false, &lot(date(2024, 2, 1), 3), today);
        assert_eq!(declined.write_off_cause, Some(WriteOffCause::NotRequested));
    }

    #[test]
    fn test_depleted_lot_accepts_reintegration() {
        let today = date(2024, 1, 5);
        assert!(decide_reintegration(true, &lot(date(2024, 2, 1), 0), today).reintegrate);
    }
}
