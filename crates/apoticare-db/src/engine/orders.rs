//! # Purchase Order Engine
//!
//! Supplier orders from draft to reception.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create_order ──► DRAFT ──mark_ordered──► ORDERED ──receive_order──►  │
//! │                      │                        │            RECEIVED     │
//! │                      └──────── cancel ────────┴──► CANCELLED            │
//! │                                                                         │
//! │  receive_order, in one transaction under the stock gate:               │
//! │    for each received line: insert lot, journal a Reception movement    │
//! │                            (reference = order id), set qty received    │
//! │    then close the order. Any failure leaves no lot behind.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::engine::{commit_failed, LedgerResult};
use crate::repository::claim_stock_gate;
use crate::repository::lot::insert_lot;
use crate::repository::medication::fetch_medication;
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::order::{
    fetch_order, fetch_order_lines, insert_order, insert_order_line, last_unit_cost,
    set_quantity_received, transition_order, PurchaseOrderRepository,
};
use apoticare_core::forecast::Prediction;
use apoticare_core::orders::plan_reception;
use apoticare_core::validation::{validate_new_order, validate_reception};
use apoticare_core::{
    Clock, CoreError, MovementKind, NewOrderLine, NewPurchaseOrder, OrderDetail, OrderReceipt,
    OrderStatus, PurchaseOrder, ReceptionRequest, MAX_LINE_QUANTITY,
};

#[derive(Debug, Clone)]
pub struct PurchaseOrderEngine {
    pool: SqlitePool,
    clock: Clock,
}

impl PurchaseOrderEngine {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        PurchaseOrderEngine { pool, clock }
    }

    fn repository(&self) -> PurchaseOrderRepository {
        PurchaseOrderRepository::new(self.pool.clone())
    }

    /// An order and its lines.
    pub async fn detail(&self, order_id: i64) -> LedgerResult<OrderDetail> {
        let repository = self.repository();
        let order = repository
            .get_by_id(order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(order_id))?;
        let lines = repository.lines(order_id).await?;

        Ok(OrderDetail { order, lines })
    }

    /// Drafts an order. Every line must name a known medication.
    pub async fn create_order(&self, order: &NewPurchaseOrder) -> LedgerResult<OrderDetail> {
        validate_new_order(order)?;

        let mut tx = self.pool.begin().await?;

        for line in &order.lines {
            fetch_medication(&mut tx, line.medication_id)
                .await?
                .ok_or(CoreError::MedicationNotFound(line.medication_id))?;
        }

        let created = insert_order(
            &mut tx,
            order.supplier_id,
            order.notes.as_deref(),
            order.user_id,
            self.clock.now(),
        )
        .await?;

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            lines.push(insert_order_line(&mut tx, created.id, line).await?);
        }

        tx.commit().await.map_err(commit_failed)?;

        info!(
            order_id = created.id,
            supplier_id = created.supplier_id,
            lines = lines.len(),
            "Purchase order drafted"
        );
        Ok(OrderDetail {
            order: created,
            lines,
        })
    }

    /// Drafts an order covering every suggestion with a quantity to order.
    ///
    /// Quantities are the suggested reorder quantities, unit costs the last
    /// price paid for the medication (0 if it was never received). Returns
    /// `None` when nothing needs ordering.
    pub async fn draft_from_suggestions(
        &self,
        supplier_id: i64,
        suggestions: &[Prediction],
        user_id: i64,
    ) -> LedgerResult<Option<OrderDetail>> {
        let wanted: Vec<&Prediction> = suggestions
            .iter()
            .filter(|p| p.suggested_reorder_quantity > 0)
            .collect();
        if wanted.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(wanted.len());
        {
            let mut conn = self.pool.acquire().await?;
            for prediction in wanted {
                lines.push(NewOrderLine {
                    medication_id: prediction.medication_id,
                    quantity: prediction.suggested_reorder_quantity.min(MAX_LINE_QUANTITY),
                    unit_cost_cents: last_unit_cost(&mut conn, prediction.medication_id)
                        .await?
                        .unwrap_or(0),
                });
            }
        }

        let order = NewPurchaseOrder {
            supplier_id,
            lines,
            notes: Some("Drafted from reorder suggestions".to_string()),
            user_id,
        };
        self.create_order(&order).await.map(Some)
    }

    /// Sends a draft to the supplier.
    pub async fn mark_ordered(&self, order_id: i64) -> LedgerResult<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let order = transition(
            &mut tx,
            order_id,
            &[OrderStatus::Draft],
            OrderStatus::Ordered,
            "order",
            self.clock,
        )
        .await?;
        tx.commit().await.map_err(commit_failed)?;

        info!(order_id, "Purchase order sent");
        Ok(order)
    }

    /// Cancels a draft or an order not yet received. No lot changes.
    pub async fn cancel(&self, order_id: i64) -> LedgerResult<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let order = transition(
            &mut tx,
            order_id,
            &[OrderStatus::Draft, OrderStatus::Ordered],
            OrderStatus::Cancelled,
            "cancel",
            self.clock,
        )
        .await?;
        tx.commit().await.map_err(commit_failed)?;

        info!(order_id, "Purchase order cancelled");
        Ok(order)
    }

    /// Receives a delivery: creates a lot per received line and closes the
    /// order, atomically.
    ///
    /// ## Errors
    /// - `Validation` for a malformed request or an already-expired batch
    /// - `OrderNotFound`, `OrderLineNotFound`
    /// - `InvalidOrderStatus` unless the order is `ORDERED`
    pub async fn receive_order(&self, request: &ReceptionRequest) -> LedgerResult<OrderReceipt> {
        validate_reception(request)?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let order = fetch_order(&mut tx, request.order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(request.order_id))?;
        let lines = fetch_order_lines(&mut tx, order.id).await?;

        let plan = match plan_reception(&order, &lines, request, self.clock.today()) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "Reception rejected");
                return Err(e.into());
            }
        };

        let mut lots = Vec::with_capacity(plan.len());
        for planned in &plan {
            let lot = insert_lot(&mut tx, &planned.lot, now).await?;
            insert_movement(
                &mut tx,
                &NewMovement {
                    lot_id: lot.id,
                    kind: MovementKind::Reception,
                    delta: lot.quantity_on_hand,
                    quantity_after: lot.quantity_on_hand,
                    reference_id: Some(order.id),
                    user_id: Some(request.user_id),
                    created_at: now,
                },
            )
            .await?;
            set_quantity_received(&mut tx, planned.order_line_id, lot.quantity_on_hand).await?;
            lots.push(lot);
        }

        let received = transition(
            &mut tx,
            order.id,
            &[OrderStatus::Ordered],
            OrderStatus::Received,
            "receive",
            self.clock,
        )
        .await?;
        let lines = fetch_order_lines(&mut tx, order.id).await?;

        tx.commit().await.map_err(commit_failed)?;

        info!(
            order_id = order.id,
            lots = lots.len(),
            units = lots.iter().map(|l| l.quantity_on_hand).sum::<i64>(),
            "Purchase order received"
        );
        Ok(OrderReceipt {
            order: received,
            lines,
            lots,
        })
    }
}

/// Applies a status change, or explains why it could not apply.
async fn transition(
    conn: &mut SqliteConnection,
    order_id: i64,
    from: &[OrderStatus],
    to: OrderStatus,
    operation: &'static str,
    clock: Clock,
) -> LedgerResult<PurchaseOrder> {
    if let Some(order) = transition_order(conn, order_id, from, to, clock.now()).await? {
        return Ok(order);
    }

    let order = fetch_order(conn, order_id)
        .await?
        .ok_or(CoreError::OrderNotFound(order_id))?;
    warn!(order_id, status = %order.status, operation, "Order transition rejected");

    Err(CoreError::InvalidOrderStatus {
        order_id,
        status: order.status.to_string(),
        operation,
    }
    .into())
}
