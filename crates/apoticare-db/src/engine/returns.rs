//! # Return Engine
//!
//! Reverses part of a committed sale against one of its lots.
//!
//! ## Decision Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  qty ≤ sold − already returned?   no  → ReturnExceedsSold              │
//! │            │ yes                                                        │
//! │            ▼                                                            │
//! │  reintegrate requested?           no  → write-off (NotRequested)       │
//! │            │ yes                                                        │
//! │            ▼                                                            │
//! │  lot expired today?               yes → write-off (LotExpired), warn   │
//! │            │ no                                                         │
//! │            ▼                                                            │
//! │  lot += qty, Return movement, same transaction as the return row       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A depleted lot that has not expired still takes units back.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::engine::inventory::{adjust_lot, Adjustment};
use crate::engine::{commit_failed, LedgerResult, MovementContext};
use crate::repository::claim_stock_gate;
use crate::repository::lot::fetch_lot;
use crate::repository::returns::{insert_return, returned_quantity, NewReturn, ReturnRepository};
use crate::repository::sale::{fetch_line, fetch_lines, fetch_sale};
use apoticare_core::returns::{
    check_return_quantity, decide_reintegration, returnable_line, RegisteredReturn, ReturnableLine,
};
use apoticare_core::validation::validate_return_request;
use apoticare_core::{Clock, CoreError, MovementKind, ReturnRequest, SaleReturn};

#[derive(Debug, Clone)]
pub struct ReturnEngine {
    pool: SqlitePool,
    clock: Clock,
}

impl ReturnEngine {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        ReturnEngine { pool, clock }
    }

    /// Records a return and, when allowed, puts the units back into the lot.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive quantity or an over-return
    /// - `SaleNotFound`, `SaleLineNotFound`, `LotNotFound`
    pub async fn register_return(&self, request: &ReturnRequest) -> LedgerResult<RegisteredReturn> {
        validate_return_request(request)?;

        let now = self.clock.now();
        let today = self.clock.today();

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        fetch_sale(&mut tx, request.sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(request.sale_id))?;

        let line = fetch_line(&mut tx, request.sale_id, request.lot_id)
            .await?
            .ok_or(CoreError::SaleLineNotFound {
                sale_id: request.sale_id,
                lot_id: request.lot_id,
            })?;

        let lot = fetch_lot(&mut tx, request.lot_id)
            .await?
            .ok_or(CoreError::LotNotFound(request.lot_id))?;

        let already_returned = returned_quantity(&mut tx, request.sale_id, request.lot_id).await?;
        if let Err(e) = check_return_quantity(
            request.sale_id,
            request.lot_id,
            line.quantity,
            already_returned,
            request.quantity,
        ) {
            warn!(sale_id = request.sale_id, lot_id = request.lot_id, error = %e, "Return rejected");
            return Err(e.into());
        }

        let decision = decide_reintegration(request.reintegrate, &lot, today);

        let record = insert_return(
            &mut tx,
            &NewReturn {
                sale_id: request.sale_id,
                lot_id: request.lot_id,
                quantity: request.quantity,
                reason: request.reason,
                reintegrated: decision.reintegrate,
                comment: request.comment.as_deref(),
                user_id: request.user_id,
                returned_at: now,
            },
        )
        .await?;

        if decision.reintegrate {
            let ctx = MovementContext::new(MovementKind::Return, Some(record.id), Some(request.user_id), now);
            adjust_lot(&mut tx, request.lot_id, Adjustment::Delta(request.quantity), &ctx).await?;
        }

        tx.commit().await.map_err(commit_failed)?;

        let registered = RegisteredReturn {
            record,
            write_off_cause: decision.write_off_cause,
        };

        if registered.was_downgraded() {
            warn!(
                return_id = registered.record.id,
                lot_id = request.lot_id,
                expiration = %lot.expiration_date,
                "Lot expired, return written off instead of reintegrated"
            );
        } else {
            info!(
                return_id = registered.record.id,
                sale_id = request.sale_id,
                lot_id = request.lot_id,
                quantity = request.quantity,
                reintegrated = registered.record.reintegrated,
                "Return registered"
            );
        }

        Ok(registered)
    }

    /// Each line of a sale with what can still be returned against it.
    pub async fn returnable_lines(&self, sale_id: i64) -> LedgerResult<Vec<ReturnableLine>> {
        let today = self.clock.today();
        let mut conn = self.pool.acquire().await?;

        fetch_sale(&mut conn, sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;

        let lines = fetch_lines(&mut conn, sale_id).await?;
        let mut returnable = Vec::with_capacity(lines.len());
        for line in lines {
            let returned = returned_quantity(&mut conn, sale_id, line.lot_id).await?;
            let lot = fetch_lot(&mut conn, line.lot_id)
                .await?
                .ok_or(CoreError::LotNotFound(line.lot_id))?;
            returnable.push(returnable_line(line, returned, &lot, today));
        }

        Ok(returnable)
    }

    pub async fn returns_for_sale(&self, sale_id: i64) -> LedgerResult<Vec<SaleReturn>> {
        Ok(ReturnRepository::new(self.pool.clone())
            .list_for_sale(sale_id)
            .await?)
    }

    pub async fn returns_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<SaleReturn>> {
        Ok(ReturnRepository::new(self.pool.clone())
            .list_between(from, to)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{date, lot, medication, quantity, test_db, three_lot_fixture};
    use crate::engine::LedgerError;
    use crate::Database;
    use apoticare_core::returns::WriteOffCause;
    use apoticare_core::{ErrorKind, ReturnReason, SaleLineRequest, SaleReceipt, SaleRequest, ValidationError};

    async fn sell(db: &Database, medication_id: i64, qty: i64) -> SaleReceipt {
        db.allocation()
            .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(medication_id, qty)], 7))
            .await
            .unwrap()
    }

    fn request(sale_id: i64, lot_id: i64, quantity: i64, reintegrate: bool) -> ReturnRequest {
        ReturnRequest {
            sale_id,
            lot_id,
            quantity,
            reason: ReturnReason::TreatmentChange,
            reintegrate,
            comment: None,
            user_id: 3,
        }
    }

    #[tokio::test]
    async fn test_reintegrated_return_credits_lot() {
        let db = test_db().await;
        let (med, _, l2, _) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 12).await;

        let registered = db
            .return_engine()
            .register_return(&request(receipt.sale.id, l2.id, 3, true))
            .await
            .unwrap();

        assert!(registered.record.reintegrated);
        assert_eq!(registered.write_off_cause, None);
        assert_eq!(quantity(&db, l2.id).await, 6);

        // the sale itself is untouched
        let sale = db.sales().get_by_id(receipt.sale.id).await.unwrap().unwrap();
        assert_eq!(sale.total_cents, receipt.sale.total_cents);
    }

    #[tokio::test]
    async fn test_full_return_restores_depleted_lot() {
        let db = test_db().await;
        let (med, l1, _, _) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 5).await;
        assert_eq!(quantity(&db, l1.id).await, 0);

        db.return_engine()
            .register_return(&request(receipt.sale.id, l1.id, 5, true))
            .await
            .unwrap();
        assert_eq!(quantity(&db, l1.id).await, 5);
    }

    #[tokio::test]
    async fn test_write_off_leaves_stock() {
        let db = test_db().await;
        let (med, _, l2, _) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 12).await;

        let registered = db
            .return_engine()
            .register_return(&request(receipt.sale.id, l2.id, 2, false))
            .await
            .unwrap();

        assert!(!registered.record.reintegrated);
        assert_eq!(registered.write_off_cause, Some(WriteOffCause::NotRequested));
        assert!(!registered.was_downgraded());
        assert_eq!(quantity(&db, l2.id).await, 3);
    }

    #[tokio::test]
    async fn test_expired_lot_downgrades_to_write_off() {
        let db = test_db().await;
        let med = medication(&db, "Sirop toux", 5, 600).await;
        let short = lot(&db, med.id, "S1", date(2024, 1, 6), 4).await;
        let receipt = sell(&db, med.id, 2).await;

        // two days later the lot has expired
        let later = db.clone().with_clock(Clock::fixed_on(date(2024, 1, 7)));
        let registered = later
            .return_engine()
            .register_return(&request(receipt.sale.id, short.id, 2, true))
            .await
            .unwrap();

        assert!(registered.was_downgraded());
        assert!(!registered.record.reintegrated);
        assert_eq!(quantity(&db, short.id).await, 2);
    }

    #[tokio::test]
    async fn test_cumulative_returns_capped_at_sold() {
        let db = test_db().await;
        let (med, _, l2, _) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 12).await;
        let engine = db.return_engine();

        engine
            .register_return(&request(receipt.sale.id, l2.id, 5, true))
            .await
            .unwrap();

        let err = engine
            .register_return(&request(receipt.sale.id, l2.id, 3, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::Validation(ValidationError::ReturnExceedsSold {
                remaining: 2,
                requested: 3,
                ..
            }))
        ));
        assert_eq!(quantity(&db, l2.id).await, 8);

        let lines = engine.returnable_lines(receipt.sale.id).await.unwrap();
        let l2_line = lines.iter().find(|l| l.line.lot_id == l2.id).unwrap();
        assert_eq!((l2_line.returned, l2_line.remaining), (5, 2));
        assert!(l2_line.reintegrable);
        assert_eq!(engine.returns_for_sale(receipt.sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let db = test_db().await;
        let (med, _, _, l3) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 2).await;
        let engine = db.return_engine();

        let err = engine.register_return(&request(999, l3.id, 1, true)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // sale drew only from L1
        let err = engine
            .register_return(&request(receipt.sale.id, l3.id, 1, true))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Domain(CoreError::SaleLineNotFound { .. })));

        let err = engine
            .register_return(&request(receipt.sale.id, l3.id, 0, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_returns_between_lists_window() {
        let db = test_db().await;
        let (med, l1, _, _) = three_lot_fixture(&db).await;
        let receipt = sell(&db, med.id, 3).await;

        db.return_engine()
            .register_return(&request(receipt.sale.id, l1.id, 1, false))
            .await
            .unwrap();

        let now = db.clock().now();
        let found = db
            .return_engine()
            .returns_between(now - chrono::Duration::days(1), now + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].reason, ReturnReason::TreatmentChange);
    }
}
