//! # Reconciliation Engine
//!
//! Physical-count sessions and the regularizations they apply.
//!
//! ## Session State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   NONE ──start_session──► IN_PROGRESS ──complete_session──► COMPLETED  │
//! │    ▲                          │   ▲                              │      │
//! │    │                          │   └── record_count (upsert)      │      │
//! │    │                          └────cancel_session──► CANCELLED   │      │
//! │    │                                                     │       │      │
//! │    └──────────────── gate released ──────────────────────┴───────┘      │
//! │                                                                         │
//! │  complete: every nonzero variance needs a reason, then every varying   │
//! │  lot is set to its physical count in one transaction.                  │
//! │  cancel: entries are discarded, no lot changes.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::engine::inventory::{adjust_lot, Adjustment};
use crate::engine::{commit_failed, LedgerResult, MovementContext};
use crate::repository::claim_stock_gate;
use crate::repository::inventory::{
    active_session_id, claim_session_gate, delete_entries, fetch_entries, fetch_session,
    finish_session, insert_session, release_session_gate, upsert_entry, InventoryRepository,
    NewCountEntry,
};
use crate::repository::lot::{fetch_lot, LotListing, LotRepository};
use apoticare_core::reconciliation::{ensure_in_progress, plan_completion, summarize, Regularization};
use apoticare_core::validation::{validate_count, validate_note};
use apoticare_core::{
    Clock, CoreError, CountEntry, CountRequest, InventorySession, MovementKind, SessionStatus,
    SessionSummary,
};

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompletion {
    pub session: InventorySession,
    /// One per lot whose count differed from the ledger.
    pub regularizations: Vec<Regularization>,
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    pool: SqlitePool,
    clock: Clock,
}

impl ReconciliationEngine {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        ReconciliationEngine { pool, clock }
    }

    fn repository(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    /// Opens a counting session.
    ///
    /// Fails with `SessionAlreadyInProgress` while another session is open.
    pub async fn start_session(
        &self,
        operator_id: i64,
        notes: Option<&str>,
    ) -> LedgerResult<InventorySession> {
        validate_note("notes", notes)?;

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        if let Some(active) = active_session_id(&mut tx).await? {
            warn!(active_session_id = active, operator_id, "Session start rejected");
            return Err(CoreError::SessionAlreadyInProgress(active).into());
        }

        let session = insert_session(&mut tx, operator_id, notes, self.clock.now()).await?;
        if !claim_session_gate(&mut tx, session.id).await? {
            return Err(CoreError::SessionAlreadyInProgress(session.id).into());
        }

        tx.commit().await.map_err(commit_failed)?;

        info!(session_id = session.id, operator_id, "Inventory session started");
        Ok(session)
    }

    /// Records (or re-records) the physical count of one lot.
    ///
    /// The theoretical quantity is the lot's quantity at this moment.
    pub async fn record_count(&self, request: &CountRequest) -> LedgerResult<CountEntry> {
        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let session = fetch_session(&mut tx, request.session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(request.session_id))?;
        ensure_in_progress(&session, "record a count")?;

        let lot = fetch_lot(&mut tx, request.lot_id)
            .await?
            .ok_or(CoreError::LotNotFound(request.lot_id))?;

        let variance = validate_count(request, lot.quantity_on_hand)?;

        let entry = upsert_entry(
            &mut tx,
            &NewCountEntry {
                session_id: session.id,
                lot_id: lot.id,
                theoretical_quantity: lot.quantity_on_hand,
                physical_quantity: request.physical_quantity,
                variance,
                reason: request.reason,
                comment: request.comment.as_deref(),
                counted_at: self.clock.now(),
            },
        )
        .await?;

        tx.commit().await.map_err(commit_failed)?;
        Ok(entry)
    }

    /// Discards every count and closes the session. No lot changes.
    pub async fn cancel_session(&self, session_id: i64) -> LedgerResult<InventorySession> {
        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let session = fetch_session(&mut tx, session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(session_id))?;
        ensure_in_progress(&session, "cancel")?;

        let discarded = delete_entries(&mut tx, session_id).await?;
        let cancelled = finish(&mut tx, &session, SessionStatus::Cancelled, self.clock).await?;

        tx.commit().await.map_err(commit_failed)?;

        info!(session_id, discarded, "Inventory session cancelled");
        Ok(cancelled)
    }

    /// Applies every regularization and closes the session, atomically.
    ///
    /// ## Errors
    /// - `Validation(UnexplainedVariances)` if a variance lacks a reason;
    ///   nothing is applied
    /// - `InvalidSessionStatus` if the session was already completed or cancelled
    pub async fn complete_session(&self, session_id: i64) -> LedgerResult<SessionCompletion> {
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let session = fetch_session(&mut tx, session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(session_id))?;
        let entries = fetch_entries(&mut tx, session_id).await?;

        let regularizations = match plan_completion(&session, &entries) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(session_id, error = %e, "Session completion rejected");
                return Err(e.into());
            }
        };

        let ctx = MovementContext::new(
            MovementKind::Regularization,
            Some(session_id),
            Some(session.operator_id),
            now,
        );
        for regularization in &regularizations {
            adjust_lot(
                &mut tx,
                regularization.lot_id,
                Adjustment::Set(regularization.physical_quantity),
                &ctx,
            )
            .await?;
        }

        let completed = finish(&mut tx, &session, SessionStatus::Completed, self.clock).await?;

        tx.commit().await.map_err(commit_failed)?;

        info!(
            session_id,
            entries = entries.len(),
            regularized = regularizations.len(),
            "Inventory session completed"
        );

        Ok(SessionCompletion {
            session: completed,
            regularizations,
        })
    }

    /// The open session, if any.
    pub async fn current_session(&self) -> LedgerResult<Option<InventorySession>> {
        Ok(self.repository().current_session().await?)
    }

    pub async fn list_sessions(&self, limit: i64) -> LedgerResult<Vec<InventorySession>> {
        Ok(self.repository().list_sessions(limit).await?)
    }

    pub async fn entries(&self, session_id: i64) -> LedgerResult<Vec<CountEntry>> {
        self.require_session(session_id).await?;
        Ok(self.repository().entries(session_id).await?)
    }

    /// Lots to walk during a count: stocked or unexpired, by medication name.
    pub async fn lots_for_counting(&self) -> LedgerResult<Vec<LotListing>> {
        Ok(LotRepository::new(self.pool.clone())
            .list_countable(self.clock.today())
            .await?)
    }

    pub async fn session_summary(&self, session_id: i64) -> LedgerResult<SessionSummary> {
        let session = self.require_session(session_id).await?;
        let entries = self.repository().entries(session_id).await?;
        Ok(summarize(session, &entries))
    }

    async fn require_session(&self, session_id: i64) -> LedgerResult<InventorySession> {
        Ok(self
            .repository()
            .get_session(session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(session_id))?)
    }
}

/// Moves the session to `status` and releases the gate.
async fn finish(
    conn: &mut sqlx::SqliteConnection,
    session: &InventorySession,
    status: SessionStatus,
    clock: Clock,
) -> LedgerResult<InventorySession> {
    let finished = finish_session(conn, session.id, status, clock.now())
        .await?
        .ok_or_else(|| CoreError::InvalidSessionStatus {
            session_id: session.id,
            status: session.status.to_string(),
            operation: "finish",
        })?;
    release_session_gate(conn, session.id).await?;
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{file_db, quantity, remove_file_db, test_db, three_lot_fixture};
    use crate::engine::LedgerError;
    use apoticare_core::{ErrorKind, ValidationError, VarianceReason};

    fn count(session_id: i64, lot_id: i64, physical: i64, reason: Option<VarianceReason>) -> CountRequest {
        CountRequest {
            session_id,
            lot_id,
            physical_quantity: physical,
            reason,
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_only_one_session_at_a_time() {
        let db = test_db().await;
        let engine = db.reconciliation();

        let first = engine.start_session(1, Some("Monthly count")).await.unwrap();
        assert_eq!(first.status, SessionStatus::InProgress);

        let err = engine.start_session(2, None).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::SessionAlreadyInProgress(id)) if id == first.id
        ));
        assert_eq!(err.kind(), ErrorKind::State);

        assert_eq!(engine.current_session().await.unwrap(), Some(first.clone()));

        engine.cancel_session(first.id).await.unwrap();
        assert_eq!(engine.current_session().await.unwrap(), None);
        engine.start_session(2, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_racing_starts_open_one_session() {
        let (db, path) = file_db("session-race").await;
        let (first, second) = (db.reconciliation(), db.reconciliation());

        let (a, b) = tokio::join!(first.start_session(1, None), second.start_session(2, None));

        let (opened, rejected) = match (a, b) {
            (Ok(session), Err(e)) | (Err(e), Ok(session)) => (session, e),
            other => panic!("expected exactly one session to open, got {:?}", other),
        };
        assert!(matches!(
            rejected,
            LedgerError::Domain(CoreError::SessionAlreadyInProgress(id)) if id == opened.id
        ));

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_sessions WHERE status = 'in_progress'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(open, 1);

        remove_file_db(db, path).await;
    }

    #[tokio::test]
    async fn test_shortfall_regularized_on_completion() {
        let db = test_db().await;
        let (_, _, l2, _) = three_lot_fixture(&db).await;
        db.lot_inventory().set_quantity(l2.id, 6, None).await.unwrap();
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();

        let err = engine.record_count(&count(session.id, l2.id, 4, None)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::Validation(ValidationError::ReasonRequired {
                variance: -2,
                ..
            }))
        ));

        let entry = engine
            .record_count(&count(session.id, l2.id, 4, Some(VarianceReason::Breakage)))
            .await
            .unwrap();
        assert_eq!(entry.theoretical_quantity, 6);
        assert_eq!(entry.variance, -2);

        let completion = engine.complete_session(session.id).await.unwrap();
        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert!(completion.session.ended_at.is_some());
        assert_eq!(completion.regularizations.len(), 1);
        assert_eq!(quantity(&db, l2.id).await, 4);

        let journal = db
            .movements()
            .list_for_reference(MovementKind::Regularization, session.id)
            .await
            .unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!((journal[0].delta, journal[0].quantity_after), (-2, 4));
    }

    #[tokio::test]
    async fn test_recount_overwrites_entry() {
        let db = test_db().await;
        let (_, l1, _, _) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();

        engine
            .record_count(&count(session.id, l1.id, 3, Some(VarianceReason::Theft)))
            .await
            .unwrap();
        engine.record_count(&count(session.id, l1.id, 5, None)).await.unwrap();

        let entries = engine.entries(session.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].variance, 0);
        assert_eq!(entries[0].reason, None);

        let completion = engine.complete_session(session.id).await.unwrap();
        assert!(completion.regularizations.is_empty());
        assert_eq!(quantity(&db, l1.id).await, 5);
    }

    #[tokio::test]
    async fn test_completing_twice_rejected() {
        let db = test_db().await;
        let (_, l1, _, _) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();
        engine
            .record_count(&count(session.id, l1.id, 7, Some(VarianceReason::EntryError)))
            .await
            .unwrap();

        engine.complete_session(session.id).await.unwrap();
        assert_eq!(quantity(&db, l1.id).await, 7);

        let err = engine.complete_session(session.id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::InvalidSessionStatus { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(quantity(&db, l1.id).await, 7);

        let err = engine
            .record_count(&count(session.id, l1.id, 1, Some(VarianceReason::Other)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_unexplained_variance_blocks_completion() {
        let db = test_db().await;
        let (_, l1, l2, _) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();

        engine
            .record_count(&count(session.id, l1.id, 2, Some(VarianceReason::Breakage)))
            .await
            .unwrap();

        // written behind the engine's back, e.g. by an older client
        sqlx::query(
            r#"
            INSERT INTO count_entries (
                session_id, lot_id, theoretical_quantity, physical_quantity,
                variance, reason, comment, counted_at
            ) VALUES (?1, ?2, 10, 9, -1, NULL, NULL, ?3)
            "#,
        )
        .bind(session.id)
        .bind(l2.id)
        .bind(db.clock().now())
        .execute(db.pool())
        .await
        .unwrap();

        let err = engine.complete_session(session.id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::Validation(ValidationError::UnexplainedVariances { ref lot_ids }))
                if lot_ids == &vec![l2.id]
        ));
        assert_eq!(quantity(&db, l1.id).await, 5);
        assert_eq!(quantity(&db, l2.id).await, 10);
        assert_eq!(engine.current_session().await.unwrap().map(|s| s.id), Some(session.id));
    }

    #[tokio::test]
    async fn test_cancel_discards_counts() {
        let db = test_db().await;
        let (_, l1, l2, _) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();

        engine
            .record_count(&count(session.id, l1.id, 0, Some(VarianceReason::Expired)))
            .await
            .unwrap();
        engine
            .record_count(&count(session.id, l2.id, 12, Some(VarianceReason::SupplierDiscrepancy)))
            .await
            .unwrap();

        let cancelled = engine.cancel_session(session.id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert!(engine.entries(session.id).await.unwrap().is_empty());
        assert_eq!(quantity(&db, l1.id).await, 5);
        assert_eq!(quantity(&db, l2.id).await, 10);

        let err = engine.complete_session(session.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_summary_counts_variances() {
        let db = test_db().await;
        let (_, l1, l2, l3) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();
        let session = engine.start_session(1, None).await.unwrap();

        engine.record_count(&count(session.id, l1.id, 5, None)).await.unwrap();
        engine
            .record_count(&count(session.id, l2.id, 8, Some(VarianceReason::Breakage)))
            .await
            .unwrap();
        engine
            .record_count(&count(session.id, l3.id, 21, Some(VarianceReason::EntryError)))
            .await
            .unwrap();

        let summary = engine.session_summary(session.id).await.unwrap();
        assert_eq!(summary.entries_counted, 3);
        assert_eq!(summary.entries_with_variance, 2);
        assert_eq!(summary.unexplained_variances, 0);
        assert_eq!(summary.net_variance, -1);

        let countable = engine.lots_for_counting().await.unwrap();
        assert_eq!(countable.len(), 3);
        assert_eq!(countable[0].medication_name, "Doliprane 1000mg");
    }

    #[tokio::test]
    async fn test_unknown_session_and_lot() {
        let db = test_db().await;
        let (_, l1, _, _) = three_lot_fixture(&db).await;
        let engine = db.reconciliation();

        let err = engine.record_count(&count(42, l1.id, 1, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let session = engine.start_session(1, None).await.unwrap();
        let err = engine.record_count(&count(session.id, 4242, 1, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine.session_summary(42).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
