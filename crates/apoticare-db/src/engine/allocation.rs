//! # Allocation Engine
//!
//! Turns a sale request into a committed sale drawn from lots in FEFO order.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         create_sale()                                   │
//! │                                                                         │
//! │  SaleRequest [(DOLIPRANE, 12)]                                         │
//! │       │ validate_sale_request                                          │
//! │       ▼                                                                 │
//! │  BEGIN + claim stock gate                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load medication + lots  ──►  plan_allocation (pure FEFO walk)         │
//! │                                    │                                    │
//! │                    ┌───────────────┴───────────────┐                   │
//! │                    ▼                               ▼                    │
//! │           InsufficientStock                 AllocationPlan              │
//! │           (drop tx: rollback)               L1 × 5, L2 × 7              │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                              insert sale, lines, decrements, movements │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                                 COMMIT                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::engine::inventory::{adjust_lot, Adjustment};
use crate::engine::{commit_failed, LedgerResult, MovementContext};
use crate::repository::claim_stock_gate;
use crate::repository::lot::fetch_lots_for_medication;
use crate::repository::medication::fetch_medication;
use crate::repository::sale::{insert_line, insert_sale, NewSale};
use apoticare_core::fefo::{plan_allocation, MedicationStock};
use apoticare_core::validation::validate_sale_request;
use apoticare_core::{Clock, CoreError, MovementKind, SaleReceipt, SaleRequest};

/// FEFO sale processing.
#[derive(Debug, Clone)]
pub struct AllocationEngine {
    pool: SqlitePool,
    clock: Clock,
}

impl AllocationEngine {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        AllocationEngine { pool, clock }
    }

    /// Creates a sale, all or nothing.
    ///
    /// ## Errors
    /// - `Validation` for an empty request or a non-positive quantity
    /// - `MedicationNotFound` for an unknown medication
    /// - `InsufficientStock` when any line cannot be covered; no lot changes
    pub async fn create_sale(&self, request: &SaleRequest) -> LedgerResult<SaleReceipt> {
        validate_sale_request(request)?;

        let now = self.clock.now();
        let today = self.clock.today();

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let mut stock: HashMap<i64, MedicationStock> = HashMap::new();
        for line in &request.lines {
            if stock.contains_key(&line.medication_id) {
                continue;
            }

            let medication = fetch_medication(&mut tx, line.medication_id)
                .await?
                .ok_or(CoreError::MedicationNotFound(line.medication_id))?;

            if medication.prescription_required && !request.prescription {
                warn!(
                    medication_id = medication.id,
                    name = %medication.commercial_name,
                    seller_id = request.seller_id,
                    "Prescription-only medication sold without prescription"
                );
            }

            let lots = fetch_lots_for_medication(&mut tx, line.medication_id).await?;
            stock.insert(line.medication_id, MedicationStock { medication, lots });
        }

        let plan = match plan_allocation(&request.lines, &stock, today) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(seller_id = request.seller_id, error = %e, "Sale rejected");
                return Err(e.into());
            }
        };

        let sale = insert_sale(
            &mut tx,
            &NewSale {
                sold_at: now,
                total_cents: plan.total().cents(),
                prescription: request.prescription,
                prescription_number: request.prescription_number.as_deref().map(str::trim),
                seller_id: request.seller_id,
                notes: request.notes.as_deref(),
            },
        )
        .await?;

        let ctx = MovementContext::new(MovementKind::Sale, Some(sale.id), Some(request.seller_id), now);
        let mut lines = Vec::with_capacity(plan.lines.len());
        for planned in &plan.lines {
            adjust_lot(&mut tx, planned.lot_id, Adjustment::Delta(-planned.quantity), &ctx).await?;
            let line = insert_line(
                &mut tx,
                sale.id,
                planned.lot_id,
                planned.medication_id,
                planned.quantity,
                planned.unit_price_cents,
            )
            .await?;
            lines.push(line);
        }

        tx.commit().await.map_err(commit_failed)?;

        info!(
            sale_id = sale.id,
            seller_id = sale.seller_id,
            lines = lines.len(),
            total = %sale.total(),
            "Sale committed"
        );

        Ok(SaleReceipt { sale, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{
        date, file_db, lot, medication, quantity, remove_file_db, test_db, three_lot_fixture,
    };
    use crate::engine::LedgerError;
    use apoticare_core::{ErrorKind, SaleLineRequest};

    #[tokio::test]
    async fn test_sale_walks_lots_fefo() {
        let db = test_db().await;
        let (med, l1, l2, l3) = three_lot_fixture(&db).await;

        let receipt = db
            .allocation()
            .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(med.id, 12)], 7))
            .await
            .unwrap();

        assert_eq!(receipt.lines.len(), 2);
        assert_eq!((receipt.lines[0].lot_id, receipt.lines[0].quantity), (l1.id, 5));
        assert_eq!((receipt.lines[1].lot_id, receipt.lines[1].quantity), (l2.id, 7));
        assert_eq!(receipt.quantity_for(med.id), 12);
        assert_eq!(receipt.sale.total_cents, 12 * 250);

        assert_eq!(quantity(&db, l1.id).await, 0);
        assert_eq!(quantity(&db, l2.id).await, 3);
        assert_eq!(quantity(&db, l3.id).await, 20);

        let stored = db.sales().get_with_lines(receipt.sale.id).await.unwrap();
        assert_eq!(stored, receipt);

        let movements = db
            .movements()
            .list_for_reference(MovementKind::Sale, receipt.sale.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[1].quantity_after, 3);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let db = test_db().await;
        let (med, l1, l2, l3) = three_lot_fixture(&db).await;

        let err = db
            .allocation()
            .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(med.id, 40)], 7))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::InsufficientStock { available: 35, requested: 40, .. })
        ));
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, l1.id).await, 5);
        assert_eq!(quantity(&db, l2.id).await, 10);
        assert_eq!(quantity(&db, l3.id).await, 20);
        assert!(db.sales().list_by_seller(7, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_second_line_rolls_back_first() {
        let db = test_db().await;
        let (med, l1, _, _) = three_lot_fixture(&db).await;
        let other = medication(&db, "Smecta", 5, 410).await;
        lot(&db, other.id, "S1", date(2024, 5, 1), 2).await;

        let request = SaleRequest::new(
            vec![SaleLineRequest::new(med.id, 3), SaleLineRequest::new(other.id, 3)],
            7,
        );
        let err = db.allocation().create_sale(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, l1.id).await, 5);
    }

    #[tokio::test]
    async fn test_duplicate_lines_share_lots() {
        let db = test_db().await;
        let (med, l1, l2, _) = three_lot_fixture(&db).await;

        let request = SaleRequest::new(
            vec![SaleLineRequest::new(med.id, 4), SaleLineRequest::new(med.id, 4)],
            7,
        );
        let receipt = db.allocation().create_sale(&request).await.unwrap();

        assert_eq!(receipt.quantity_for(med.id), 8);
        assert_eq!(quantity(&db, l1.id).await, 0);
        assert_eq!(quantity(&db, l2.id).await, 7);
    }

    #[tokio::test]
    async fn test_expired_lots_are_never_sold() {
        let db = test_db().await;
        let med = medication(&db, "Vitamine C", 5, 120).await;
        let expired = lot(&db, med.id, "OLD", date(2024, 1, 1), 50).await;
        let fresh = lot(&db, med.id, "NEW", date(2024, 9, 1), 3).await;

        let request = SaleRequest::new(vec![SaleLineRequest::new(med.id, 4)], 7);
        let err = db.allocation().create_sale(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let request = SaleRequest::new(vec![SaleLineRequest::new(med.id, 3)], 7);
        db.allocation().create_sale(&request).await.unwrap();
        assert_eq!(quantity(&db, expired.id).await, 50);
        assert_eq!(quantity(&db, fresh.id).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_before_store() {
        let db = test_db().await;
        let (med, _, _, _) = three_lot_fixture(&db).await;

        for qty in [0, -3] {
            let request = SaleRequest::new(vec![SaleLineRequest::new(med.id, qty)], 7);
            let err = db.allocation().create_sale(&request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let err = db
            .allocation()
            .create_sale(&SaleRequest::new(vec![], 7))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let request = SaleRequest::new(vec![SaleLineRequest::new(999, 1)], 7);
        let err = db.allocation().create_sale(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_prescription_sale_recorded() {
        let db = test_db().await;
        let (med, _, _, _) = three_lot_fixture(&db).await;

        let request = SaleRequest::new(vec![SaleLineRequest::new(med.id, 1)], 7)
            .with_prescription(Some(" ORD-2024-118 ".to_string()));
        let receipt = db.allocation().create_sale(&request).await.unwrap();

        assert!(receipt.sale.prescription);
        assert_eq!(receipt.sale.prescription_number.as_deref(), Some("ORD-2024-118"));
    }

    #[tokio::test]
    async fn test_concurrent_sales_never_oversell() {
        let (db, path) = file_db("sale-race").await;
        let med = medication(&db, "Doliprane 500mg", 5, 200).await;
        let only = lot(&db, med.id, "L1", date(2024, 6, 1), 10).await;

        let request = SaleRequest::new(vec![SaleLineRequest::new(med.id, 6)], 1);
        let (first, second) = (db.allocation(), db.allocation());
        let (a, b) = tokio::join!(first.create_sale(&request), second.create_sale(&request));

        let committed = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(committed, 1);
        let loser = a.err().or(b.err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, only.id).await, 4);

        remove_file_db(db, path).await;
    }
}
