//! # FEFO Allocation Planner
//!
//! Turns a sale request into per-lot lines, First-Expired-First-Out.
//!
//! ## Allocation Walk
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request: DOLIPRANE × 12                                                │
//! │                                                                         │
//! │  FEFO order (expiration asc, lot id asc):                              │
//! │    L1  exp 2024-01-10  qty 5   → take 5   remaining 7                  │
//! │    L2  exp 2024-02-01  qty 10  → take 7   remaining 0  ✓ stop          │
//! │    L3  exp 2024-03-01  qty 20  (untouched)                             │
//! │                                                                         │
//! │  Plan: [(L1, 5), (L2, 7)]   total = 12 × unit price                    │
//! │                                                                         │
//! │  Lots exhausted with remaining > 0 → InsufficientStock, NO plan at all │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The planner is pure: it reads snapshots and returns a plan. The allocation
//! engine applies the plan inside one transaction, under the write lock it
//! took before reading the snapshots.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Lot, Medication, SaleLineRequest};

// =============================================================================
// Ordering
// =============================================================================

/// Sorts lots into FEFO order: expiration ascending, then lot id ascending.
pub fn fefo_order(lots: &mut [Lot]) {
    lots.sort_by(|a, b| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then(a.id.cmp(&b.id))
    });
}

/// Lots eligible for allocation, in FEFO order.
pub fn allocatable_lots(lots: &[Lot], today: NaiveDate) -> Vec<Lot> {
    let mut eligible: Vec<Lot> = lots
        .iter()
        .filter(|lot| lot.is_vendable(today))
        .cloned()
        .collect();
    fefo_order(&mut eligible);
    eligible
}

/// Σ quantity over unexpired lots.
pub fn vendable_stock(lots: &[Lot], today: NaiveDate) -> i64 {
    lots.iter()
        .filter(|lot| !lot.is_expired(today))
        .map(|lot| lot.quantity_on_hand)
        .sum()
}

// =============================================================================
// Plan Types
// =============================================================================

/// What the allocation engine needs to know about one medication.
#[derive(Debug, Clone)]
pub struct MedicationStock {
    pub medication: Medication,
    /// Lots of this medication. Order and expiry filtering are redone here.
    pub lots: Vec<Lot>,
}

/// One lot draw of a planned sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLine {
    pub lot_id: i64,
    pub medication_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl PlannedLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A complete, satisfiable allocation. Lots appear at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<PlannedLine>,
}

impl AllocationPlan {
    /// Σ line quantity × unit price.
    pub fn total(&self) -> Money {
        self.lines.iter().map(PlannedLine::line_total).sum()
    }

    /// Units planned for one medication.
    pub fn quantity_for(&self, medication_id: i64) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.medication_id == medication_id)
            .map(|l| l.quantity)
            .sum()
    }

    fn add(&mut self, line: PlannedLine) {
        match self.lines.iter_mut().find(|l| l.lot_id == line.lot_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => self.lines.push(line),
        }
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Plans a whole sale. Either every requested line is satisfied or an error
/// is returned and nothing is planned.
///
/// Several request lines may name the same medication; lot consumption is
/// tracked across them so the plan never takes a unit twice.
///
/// ## Errors
/// - `MedicationNotFound` when a line names a medication missing from `stock`
/// - `InsufficientStock` when the FEFO walk runs out of lots
pub fn plan_allocation(
    lines: &[SaleLineRequest],
    stock: &HashMap<i64, MedicationStock>,
    today: NaiveDate,
) -> CoreResult<AllocationPlan> {
    let mut plan = AllocationPlan::default();
    let mut consumed: HashMap<i64, i64> = HashMap::new();

    for request in lines {
        let entry = stock
            .get(&request.medication_id)
            .ok_or(CoreError::MedicationNotFound(request.medication_id))?;

        let lots = allocatable_lots(&entry.lots, today);
        let mut remaining = request.quantity;
        let mut drawn = Vec::new();

        for lot in &lots {
            if remaining == 0 {
                break;
            }

            let used = consumed.get(&lot.id).copied().unwrap_or(0);
            let available = lot.quantity_on_hand - used;
            if available <= 0 {
                continue;
            }

            let allocated = available.min(remaining);
            drawn.push(PlannedLine {
                lot_id: lot.id,
                medication_id: request.medication_id,
                quantity: allocated,
                unit_price_cents: entry.medication.unit_price_cents,
            });
            remaining -= allocated;
        }

        if remaining > 0 {
            let available: i64 = lots
                .iter()
                .map(|lot| lot.quantity_on_hand - consumed.get(&lot.id).copied().unwrap_or(0))
                .sum();
            return Err(CoreError::InsufficientStock {
                medication_id: request.medication_id,
                available,
                requested: request.quantity,
            });
        }

        for line in drawn {
            *consumed.entry(line.lot_id).or_insert(0) += line.quantity;
            plan.add(line);
        }
    }

    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================
