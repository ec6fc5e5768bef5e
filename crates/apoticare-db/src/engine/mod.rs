//! # Ledger Engines
//!
//! Transactional operations over the store. Each public engine call is one
//! unit of work: it either commits every write or leaves the ledger as it was.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Anatomy of a Mutating Call                            │
//! │                                                                         │
//! │  validate input (core)          ── ValidationError, nothing opened     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  claim stock gate               ── takes the write lock                │
//! │  read lots / session / sale     ── state nobody else can change now    │
//! │  plan (core, pure)              ── InsufficientStock, State, ...       │
//! │  write rows + movements                                                │
//! │  COMMIT                         ── or drop the transaction: ROLLBACK   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read-side engines (forecast, alerts) go through a [`StockReadScope`] and
//! never open a write transaction.

pub mod alerts;
pub mod allocation;
pub mod cache;
pub mod forecast;
pub mod inventory;
pub mod orders;
pub mod reconciliation;
pub mod returns;

pub use alerts::AlertEvaluator;
pub use allocation::AllocationEngine;
pub use cache::StockReadScope;
pub use forecast::ReplenishmentForecaster;
pub use inventory::{Adjustment, LotInventory};
pub use orders::PurchaseOrderEngine;
pub use reconciliation::{ReconciliationEngine, SessionCompletion};
pub use returns::ReturnEngine;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::DbError;
use apoticare_core::{CoreError, ErrorKind, MovementKind, ValidationError};

// =============================================================================
// Ledger Error
// =============================================================================

/// Error returned by every engine call.
///
/// ```text
/// LedgerError
/// ├── Domain(CoreError)   business rule: validation, stock, state, not found
/// └── Store(DbError)      infrastructure: busy, constraint, I/O
/// ```
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl LedgerError {
    /// Caller-facing category.
    ///
    /// A store `NotFound` is reported as not-found; every other store error
    /// is infrastructure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(e) => e.kind(),
            LedgerError::Store(DbError::NotFound { .. }) => ErrorKind::NotFound,
            LedgerError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// True when retrying the whole call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Domain(_) => false,
            LedgerError::Store(e) => e.is_retryable(),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Domain(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(DbError::from(err))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Movement Context
// =============================================================================

/// Who and what caused a lot mutation, written to the movement journal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MovementContext {
    pub kind: MovementKind,
    pub reference_id: Option<i64>,
    pub user_id: Option<i64>,
    pub at: DateTime<Utc>,
}

impl MovementContext {
    pub fn new(
        kind: MovementKind,
        reference_id: Option<i64>,
        user_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Self {
        MovementContext {
            kind,
            reference_id,
            user_id,
            at,
        }
    }
}

/// Maps a failed commit to an infrastructure error.
pub(crate) fn commit_failed(err: sqlx::Error) -> LedgerError {
    LedgerError::Store(DbError::TransactionFailed(err.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the engine tests.

    use chrono::NaiveDate;
    use std::path::PathBuf;

    use crate::pool::{Database, DbConfig};
    use apoticare_core::{Clock, Lot, Medication, NewLot, NewMedication};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// In-memory ledger pinned to 2024-01-05.
    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_clock(Clock::fixed_on(date(2024, 1, 5)))
    }

    pub async fn medication(db: &Database, name: &str, threshold: i64, price: i64) -> Medication {
        db.register_medication(&NewMedication {
            commercial_name: name.to_string(),
            active_ingredient: "Paracetamol".to_string(),
            reorder_threshold: Some(threshold),
            unit_price_cents: price,
            prescription_required: false,
        })
        .await
        .unwrap()
    }

    pub async fn lot(db: &Database, medication_id: i64, number: &str, exp: NaiveDate, qty: i64) -> Lot {
        db.lots()
            .receive(
                &NewLot {
                    medication_id,
                    lot_number: number.to_string(),
                    expiration_date: exp,
                    quantity: qty,
                    purchase_price_cents: 100,
                    supplier_id: None,
                },
                None,
                db.clock().now(),
            )
            .await
            .unwrap()
    }

    /// File-backed WAL ledger with a pool wide enough for racing writers.
    pub async fn file_db(name: &str) -> (Database, PathBuf) {
        let path = std::env::temp_dir().join(format!("ledger-{}-{}.db", name, uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap()
            .with_clock(Clock::fixed_on(date(2024, 1, 5)));
        (db, path)
    }

    pub async fn remove_file_db(db: Database, path: PathBuf) {
        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    /// Medication M with L1 (5, 2024-01-10), L2 (10, 2024-02-01), L3 (20, 2024-03-01).
    pub async fn three_lot_fixture(db: &Database) -> (Medication, Lot, Lot, Lot) {
        let med = medication(db, "Doliprane 1000mg", 20, 250).await;
        let l1 = lot(db, med.id, "L1", date(2024, 1, 10), 5).await;
        let l2 = lot(db, med.id, "L2", date(2024, 2, 1), 10).await;
        let l3 = lot(db, med.id, "L3", date(2024, 3, 1), 20).await;
        (med, l1, l2, l3)
    }

    pub async fn quantity(db: &Database, lot_id: i64) -> i64 {
        db.lots().get_by_id(lot_id).await.unwrap().unwrap().quantity_on_hand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: LedgerError = CoreError::InsufficientStock {
            medication_id: 1,
            available: 35,
            requested: 40,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err: LedgerError = ValidationError::EmptySale.into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: LedgerError = DbError::not_found("Sale", 9).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: LedgerError = DbError::Busy("database is locked".into()).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.is_retryable());
    }
}
