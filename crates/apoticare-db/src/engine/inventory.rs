//! # Lot Inventory
//!
//! Authoritative per-lot quantities. Every quantity change in the ledger goes
//! through [`adjust_lot`], which applies the change with a guarded UPDATE and
//! journals it in the same transaction.
//!
//! ## Mutation Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE lots SET qty = qty + Δ  WHERE id = ? AND qty + Δ >= 0          │
//! │                                                                         │
//! │  row returned  → journal movement, return quantity after               │
//! │  no row        → lot missing?  LotNotFound                             │
//! │                  otherwise     NegativeStock (StateError)              │
//! │                                                                         │
//! │  Set(q) is Δ = q − current, read under the stock gate.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::engine::{commit_failed, LedgerResult, MovementContext};
use crate::repository::lot::{apply_delta, fetch_lot, LotRepository};
use crate::repository::medication::fetch_medication;
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::claim_stock_gate;
use apoticare_core::validation::validate_new_lot;
use apoticare_core::{Clock, CoreError, Lot, MovementKind, NewLot, ValidationError};

/// A single-lot quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Add (or, when negative, remove) units.
    Delta(i64),
    /// Overwrite the quantity on hand.
    Set(i64),
}

/// Applies one lot adjustment inside the caller's transaction.
///
/// The caller must have claimed the stock gate. Returns the quantity after.
pub(crate) async fn adjust_lot(
    conn: &mut SqliteConnection,
    lot_id: i64,
    adjustment: Adjustment,
    ctx: &MovementContext,
) -> LedgerResult<i64> {
    let delta = match adjustment {
        Adjustment::Delta(delta) => delta,
        Adjustment::Set(target) => {
            let lot = fetch_lot(conn, lot_id)
                .await?
                .ok_or(CoreError::LotNotFound(lot_id))?;
            target - lot.quantity_on_hand
        }
    };

    let Some(quantity_after) = apply_delta(conn, lot_id, delta).await? else {
        let lot = fetch_lot(conn, lot_id)
            .await?
            .ok_or(CoreError::LotNotFound(lot_id))?;
        warn!(lot_id, on_hand = lot.quantity_on_hand, delta, "Rejected negative lot quantity");
        return Err(CoreError::NegativeStock {
            lot_id,
            on_hand: lot.quantity_on_hand,
            delta,
        }
        .into());
    };

    insert_movement(
        conn,
        &NewMovement {
            lot_id,
            kind: ctx.kind,
            delta,
            quantity_after,
            reference_id: ctx.reference_id,
            user_id: ctx.user_id,
            created_at: ctx.at,
        },
    )
    .await?;

    debug!(lot_id, delta, quantity_after, kind = ?ctx.kind, "Lot adjusted");
    Ok(quantity_after)
}

/// Engine over lot-level stock.
#[derive(Debug, Clone)]
pub struct LotInventory {
    pool: SqlitePool,
    clock: Clock,
}

impl LotInventory {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        LotInventory { pool, clock }
    }

    fn lots(&self) -> LotRepository {
        LotRepository::new(self.pool.clone())
    }

    async fn ensure_medication(&self, medication_id: i64) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await?;
        fetch_medication(&mut conn, medication_id)
            .await?
            .ok_or(CoreError::MedicationNotFound(medication_id))?;
        Ok(())
    }

    /// Sellable lots of a medication in FEFO order.
    pub async fn get_lots_fefo(&self, medication_id: i64) -> LedgerResult<Vec<Lot>> {
        self.ensure_medication(medication_id).await?;
        Ok(self
            .lots()
            .lots_for_allocation(medication_id, self.clock.today())
            .await?)
    }

    /// Σ quantity over unexpired lots.
    pub async fn vendable_stock(&self, medication_id: i64) -> LedgerResult<i64> {
        self.ensure_medication(medication_id).await?;
        Ok(self
            .lots()
            .vendable_stock(medication_id, self.clock.today())
            .await?)
    }

    /// Σ quantity over all lots, expired included.
    pub async fn total_stock(&self, medication_id: i64) -> LedgerResult<i64> {
        self.ensure_medication(medication_id).await?;
        Ok(self.lots().total_stock(medication_id).await?)
    }

    /// Registers a received lot.
    pub async fn receive(&self, lot: &NewLot, user_id: Option<i64>) -> LedgerResult<Lot> {
        validate_new_lot(lot)?;
        self.ensure_medication(lot.medication_id).await?;
        Ok(self.lots().receive(lot, user_id, self.clock.now()).await?)
    }

    /// Removes `quantity` units from a lot.
    pub async fn decrement(
        &self,
        lot_id: i64,
        quantity: i64,
        user_id: Option<i64>,
    ) -> LedgerResult<Lot> {
        require_positive(quantity)?;
        self.apply(lot_id, Adjustment::Delta(-quantity), user_id).await
    }

    /// Adds `quantity` units to a lot.
    pub async fn increment(
        &self,
        lot_id: i64,
        quantity: i64,
        user_id: Option<i64>,
    ) -> LedgerResult<Lot> {
        require_positive(quantity)?;
        self.apply(lot_id, Adjustment::Delta(quantity), user_id).await
    }

    /// Overwrites a lot's quantity. A negative target is a state error.
    pub async fn set_quantity(
        &self,
        lot_id: i64,
        quantity: i64,
        user_id: Option<i64>,
    ) -> LedgerResult<Lot> {
        self.apply(lot_id, Adjustment::Set(quantity), user_id).await
    }

    /// Manual adjustments are journaled as regularizations without a reference.
    async fn apply(
        &self,
        lot_id: i64,
        adjustment: Adjustment,
        user_id: Option<i64>,
    ) -> LedgerResult<Lot> {
        let ctx = MovementContext::new(MovementKind::Regularization, None, user_id, self.clock.now());

        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let quantity_after = adjust_lot(&mut tx, lot_id, adjustment, &ctx).await?;
        let lot = fetch_lot(&mut tx, lot_id)
            .await?
            .ok_or(CoreError::LotNotFound(lot_id))?;

        tx.commit().await.map_err(commit_failed)?;

        info!(lot_id, quantity_after, ?adjustment, "Lot quantity changed");
        Ok(lot)
    }
}

fn require_positive(quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}
