//! # Purchase Order Rules
//!
//! Status checks for supplier orders and the plan that turns a delivery into
//! lots.
//!
//! ## Reception
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ORDERED order            ReceptionRequest                              │
//! │  line 7: DOLIPRANE × 50   line 7: B-2291, exp 2026-03, qty 48           │
//! │  line 8: SMECTA × 20      (line 8 not listed: nothing arrived)          │
//! │            │                         │                                  │
//! │            └──────────┬──────────────┘                                  │
//! │                       ▼                                                 │
//! │  plan_reception: one NewLot per received line                           │
//! │    medication, supplier and cost come from the order                    │
//! │    lot number, expiration and quantity come from the delivery           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{NewLot, OrderLine, OrderStatus, PurchaseOrder, ReceptionRequest};

/// One lot to create for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReception {
    pub order_line_id: i64,
    pub lot: NewLot,
}

/// Fails unless the order is in one of `allowed`.
pub fn ensure_status(
    order: &PurchaseOrder,
    allowed: &[OrderStatus],
    operation: &'static str,
) -> CoreResult<()> {
    if !allowed.contains(&order.status) {
        return Err(CoreError::InvalidOrderStatus {
            order_id: order.id,
            status: order.status.to_string(),
            operation,
        });
    }
    Ok(())
}

/// Checks that the order can be received and maps the delivery onto its lines.
///
/// ## Errors
/// - `InvalidOrderStatus` unless the order is `ORDERED`
/// - `OrderLineNotFound` if a received line is not on this order
/// - `Validation(Invalid)` if a received batch is already expired
pub fn plan_reception(
    order: &PurchaseOrder,
    lines: &[OrderLine],
    request: &ReceptionRequest,
    today: NaiveDate,
) -> CoreResult<Vec<PlannedReception>> {
    ensure_status(order, &[OrderStatus::Ordered], "receive")?;

    let mut plan = Vec::with_capacity(request.lines.len());
    for received in &request.lines {
        let line = lines
            .iter()
            .find(|l| l.id == received.order_line_id)
            .ok_or(CoreError::OrderLineNotFound {
                order_id: order.id,
                line_id: received.order_line_id,
            })?;

        if received.quantity == 0 {
            continue;
        }

        if received.expiration_date < today {
            return Err(ValidationError::Invalid {
                field: "expiration_date".to_string(),
                reason: format!("lot {} expired on {}", received.lot_number.trim(), received.expiration_date),
            }
            .into());
        }

        plan.push(PlannedReception {
            order_line_id: line.id,
            lot: NewLot {
                medication_id: line.medication_id,
                lot_number: received.lot_number.trim().to_string(),
                expiration_date: received.expiration_date,
                quantity: received.quantity,
                purchase_price_cents: line.unit_cost_cents,
                supplier_id: Some(order.supplier_id),
            },
        });
    }

    Ok(plan)
}

/// Σ ordered cost over the lines.
pub fn order_total(lines: &[OrderLine]) -> Money {
    lines.iter().map(OrderLine::ordered_cost).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReceivedLine;
    use chrono::Utc;

    fn order(status: OrderStatus) -> PurchaseOrder {
        PurchaseOrder {
            id: 4,
            supplier_id: 12,
            status,
            notes: None,
            created_by: 1,
            created_at: Utc::now(),
            ordered_at: None,
            received_at: None,
        }
    }

    fn line(id: i64, medication_id: i64, quantity: i64) -> OrderLine {
        OrderLine {
            id,
            order_id: 4,
            medication_id,
            quantity_ordered: quantity,
            quantity_received: 0,
            unit_cost_cents: 150,
        }
    }

    fn received(order_line_id: i64, expiration_date: NaiveDate, quantity: i64) -> ReceivedLine {
        ReceivedLine {
            order_line_id,
            lot_number: format!(" CMD4-{order_line_id} "),
            expiration_date,
            quantity,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reception_takes_order_details() {
        let today = date(2024, 1, 5);
        let request = ReceptionRequest {
            order_id: 4,
            lines: vec![received(7, date(2025, 6, 1), 48), received(8, date(2025, 1, 1), 0)],
            user_id: 1,
        };

        let plan = plan_reception(
            &order(OrderStatus::Ordered),
            &[line(7, 1, 50), line(8, 2, 20)],
            &request,
            today,
        )
        .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].order_line_id, 7);
        assert_eq!(plan[0].lot.medication_id, 1);
        assert_eq!(plan[0].lot.lot_number, "CMD4-7");
        assert_eq!(plan[0].lot.quantity, 48);
        assert_eq!(plan[0].lot.purchase_price_cents, 150);
        assert_eq!(plan[0].lot.supplier_id, Some(12));
    }

    #[test]
    fn test_reception_rejects_drafts_and_foreign_lines() {
        let today = date(2024, 1, 5);
        let request = ReceptionRequest {
            order_id: 4,
            lines: vec![received(9, date(2025, 6, 1), 10)],
            user_id: 1,
        };
        let lines = [line(7, 1, 50)];

        assert!(matches!(
            plan_reception(&order(OrderStatus::Draft), &lines, &request, today),
            Err(CoreError::InvalidOrderStatus { operation: "receive", .. })
        ));
        assert!(matches!(
            plan_reception(&order(OrderStatus::Ordered), &lines, &request, today),
            Err(CoreError::OrderLineNotFound { order_id: 4, line_id: 9 })
        ));
    }

    #[test]
    fn test_reception_rejects_expired_batches() {
        let today = date(2024, 1, 5);
        let request = ReceptionRequest {
            order_id: 4,
            lines: vec![received(7, date(2024, 1, 4), 10)],
            user_id: 1,
        };

        let err = plan_reception(&order(OrderStatus::Ordered), &[line(7, 1, 50)], &request, today)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Invalid { .. })));

        // Expiring today is still sellable today
        let request = ReceptionRequest {
            lines: vec![received(7, today, 10)],
            ..request
        };
        assert!(plan_reception(&order(OrderStatus::Ordered), &[line(7, 1, 50)], &request, today).is_ok());
    }

    #[test]
    fn test_order_total() {
        assert_eq!(order_total(&[line(1, 1, 10), line(2, 2, 4)]).cents(), 2100);
        assert_eq!(order_total(&[]).cents(), 0);
    }
}
