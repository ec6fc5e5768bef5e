//! # Reconciliation Rules
//!
//! State checks and variance rules for inventory counting sessions.
//!
//! ## Session State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   NONE ──start──► IN_PROGRESS ──complete──► COMPLETED                  │
//! │                     │   ▲                   (regularizations applied)   │
//! │                     │   │ record_count                                  │
//! │                     │   │ (upsert per lot)                              │
//! │                     └───┘                                               │
//! │                     │                                                   │
//! │                     └─────cancel──────────► CANCELLED                   │
//! │                                             (entries discarded)         │
//! │                                                                         │
//! │   Terminal states accept nothing. Completing requires every nonzero    │
//! │   variance to carry a reason.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{CountEntry, InventorySession, SessionStatus, SessionSummary};

/// One lot quantity to overwrite on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regularization {
    pub lot_id: i64,
    /// Ledger quantity captured at count time.
    pub theoretical_quantity: i64,
    /// Quantity the lot is set to.
    pub physical_quantity: i64,
    pub variance: i64,
}

/// Fails unless the session is still open.
pub fn ensure_in_progress(session: &InventorySession, operation: &'static str) -> CoreResult<()> {
    if session.status != SessionStatus::InProgress {
        return Err(CoreError::InvalidSessionStatus {
            session_id: session.id,
            status: session.status.to_string(),
            operation,
        });
    }
    Ok(())
}

/// Lots whose variance has no reason, in entry order.
pub fn unexplained_lots(entries: &[CountEntry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|e| e.is_unexplained())
        .map(|e| e.lot_id)
        .collect()
}

/// Checks that the session can complete and returns the regularizations to
/// apply, one per entry with a nonzero variance.
///
/// ## Errors
/// - `InvalidSessionStatus` if the session is not in progress
/// - `Validation(UnexplainedVariances)` if any variance lacks a reason
pub fn plan_completion(
    session: &InventorySession,
    entries: &[CountEntry],
) -> CoreResult<Vec<Regularization>> {
    ensure_in_progress(session, "complete")?;

    let lot_ids = unexplained_lots(entries);
    if !lot_ids.is_empty() {
        return Err(ValidationError::UnexplainedVariances { lot_ids }.into());
    }

    Ok(entries
        .iter()
        .filter(|e| e.has_variance())
        .map(|e| Regularization {
            lot_id: e.lot_id,
            theoretical_quantity: e.theoretical_quantity,
            physical_quantity: e.physical_quantity,
            variance: e.variance,
        })
        .collect())
}

/// Totals for the closing screen.
pub fn summarize(session: InventorySession, entries: &[CountEntry]) -> SessionSummary {
    SessionSummary {
        session,
        entries_counted: entries.len() as i64,
        entries_with_variance: entries.iter().filter(|e| e.has_variance()).count() as i64,
        unexplained_variances: entries.iter().filter(|e| e.is_unexplained()).count() as i64,
        net_variance: entries.iter().map(|e| e.variance).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarianceReason;
    use chrono::Utc;

    fn session(status: SessionStatus) -> InventorySession {
        InventorySession {
            id: 3,
            started_at: Utc::now(),
            ended_at: None,
            status,
            operator_id: 1,
            notes: None,
        }
    }

    fn entry(lot_id: i64, theoretical: i64, physical: i64, reason: Option<VarianceReason>) -> CountEntry {
        CountEntry {
            id: lot_id,
            session_id: 3,
            lot_id,
            theoretical_quantity: theoretical,
            physical_quantity: physical,
            variance: physical - theoretical,
            reason,
            comment: None,
            counted_at: Utc::now(),
        }
    }

    #[test]
    fn test_completion_yields_regularizations_for_variances_only() {
        let entries = vec![
            entry(1, 6, 4, Some(VarianceReason::Breakage)),
            entry(2, 10, 10, None),
        ];
        let plan = plan_completion(&session(SessionStatus::InProgress), &entries).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_id, 1);
        assert_eq!(plan[0].physical_quantity, 4);
        assert_eq!(plan[0].variance, -2);
    }

    #[test]
    fn test_unexplained_variance_blocks_completion() {
        let entries = vec![entry(1, 6, 4, None), entry(2, 3, 5, Some(VarianceReason::EntryError))];
        let err = plan_completion(&session(SessionStatus::InProgress), &entries).unwrap_err();

        match err {
            CoreError::Validation(ValidationError::UnexplainedVariances { lot_ids }) => {
                assert_eq!(lot_ids, vec![1]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_sessions_reject_operations() {
        for status in [SessionStatus::Completed, SessionStatus::Cancelled] {
            let err = plan_completion(&session(status), &[]).unwrap_err();
            assert!(matches!(err, CoreError::InvalidSessionStatus { .. }));
        }
    }

    #[test]
    fn test_summary() {
        let entries = vec![
            entry(1, 6, 4, Some(VarianceReason::Theft)),
            entry(2, 10, 11, None),
            entry(3, 5, 5, None),
        ];
        let summary = summarize(session(SessionStatus::InProgress), &entries);
        assert_eq!(summary.entries_counted, 3);
        assert_eq!(summary.entries_with_variance, 2);
        assert_eq!(summary.unexplained_variances, 1);
        assert_eq!(summary.net_variance, -1);
    }
}
