//! # Lot Repository
//!
//! SQL for lot-level stock. Filtering by expiration always compares against
//! a `today` supplied by the caller's clock.
//!
//! ## Query Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lots_for_allocation   qty > 0 AND exp >= today  ORDER BY exp, id      │
//! │  vendable_stock        Σ qty WHERE exp >= today                        │
//! │  total_stock           Σ qty (expired included, display only)          │
//! │  expiring_between      qty > 0 AND today <= exp <= until               │
//! │  expired_with_stock    qty > 0 AND exp < today                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations are transaction-scoped helpers; the engines own the transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::claim_stock_gate;
use apoticare_core::{Lot, MovementKind, NewLot};

const LOT_COLUMNS: &str = r#"
    lots.id, lots.medication_id, lots.lot_number, lots.expiration_date,
    lots.quantity_on_hand, lots.purchase_price_cents, lots.supplier_id, lots.received_at
"#;

/// A lot with its medication's commercial name, for alert listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LotListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lot: Lot,
    pub medication_name: String,
}

/// Repository for lot reads and receptions.
#[derive(Debug, Clone)]
pub struct LotRepository {
    pool: SqlitePool,
}

impl LotRepository {
    /// Creates a new LotRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LotRepository { pool }
    }

    /// Gets a lot by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Lot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lot(&mut conn, id).await
    }

    /// Every lot of a medication in FEFO order, expired and empty included.
    pub async fn list_for_medication(&self, medication_id: i64) -> DbResult<Vec<Lot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lots_for_medication(&mut conn, medication_id).await
    }

    /// Lots that can be sold today, in FEFO order.
    pub async fn lots_for_allocation(
        &self,
        medication_id: i64,
        today: NaiveDate,
    ) -> DbResult<Vec<Lot>> {
        let lots = sqlx::query_as::<_, Lot>(&format!(
            r#"
            SELECT {LOT_COLUMNS} FROM lots
            WHERE medication_id = ?1
              AND quantity_on_hand > 0
              AND expiration_date >= ?2
            ORDER BY expiration_date, id
            "#
        ))
        .bind(medication_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        debug!(medication_id, count = lots.len(), "Fetched FEFO lots");
        Ok(lots)
    }

    /// Σ quantity over unexpired lots.
    pub async fn vendable_stock(&self, medication_id: i64, today: NaiveDate) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity_on_hand), 0) FROM lots
            WHERE medication_id = ?1 AND expiration_date >= ?2
            "#,
        )
        .bind(medication_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Σ quantity over every lot, expired included.
    pub async fn total_stock(&self, medication_id: i64) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_on_hand), 0) FROM lots WHERE medication_id = ?1",
        )
        .bind(medication_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Vendable stock of every medication holding any, keyed by medication id.
    pub async fn vendable_stock_by_medication(
        &self,
        today: NaiveDate,
    ) -> DbResult<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT medication_id, COALESCE(SUM(quantity_on_hand), 0) FROM lots
            WHERE expiration_date >= ?1
            GROUP BY medication_id
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Lots worth counting: anything with stock on hand or not yet expired.
    pub async fn list_countable(&self, today: NaiveDate) -> DbResult<Vec<LotListing>> {
        let lots = sqlx::query_as::<_, LotListing>(&format!(
            r#"
            SELECT {LOT_COLUMNS}, medications.commercial_name AS medication_name
            FROM lots JOIN medications ON medications.id = lots.medication_id
            WHERE lots.quantity_on_hand > 0 OR lots.expiration_date >= ?1
            ORDER BY medications.commercial_name, lots.expiration_date, lots.id
            "#
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    /// Lots holding stock that expire in `[today, until]`, soonest first.
    pub async fn expiring_between(
        &self,
        today: NaiveDate,
        until: NaiveDate,
    ) -> DbResult<Vec<LotListing>> {
        let lots = sqlx::query_as::<_, LotListing>(&format!(
            r#"
            SELECT {LOT_COLUMNS}, medications.commercial_name AS medication_name
            FROM lots JOIN medications ON medications.id = lots.medication_id
            WHERE lots.quantity_on_hand > 0
              AND lots.expiration_date >= ?1
              AND lots.expiration_date <= ?2
            ORDER BY lots.expiration_date, lots.id
            "#
        ))
        .bind(today)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    /// Expired lots still holding stock, oldest expiration first.
    pub async fn expired_with_stock(&self, today: NaiveDate) -> DbResult<Vec<LotListing>> {
        let lots = sqlx::query_as::<_, LotListing>(&format!(
            r#"
            SELECT {LOT_COLUMNS}, medications.commercial_name AS medication_name
            FROM lots JOIN medications ON medications.id = lots.medication_id
            WHERE lots.quantity_on_hand > 0 AND lots.expiration_date < ?1
            ORDER BY lots.expiration_date, lots.id
            "#
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    /// Registers a received lot and journals a `Reception` movement.
    ///
    /// Input is validated by the caller; the medication must exist.
    pub async fn receive(
        &self,
        lot: &NewLot,
        user_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<Lot> {
        let mut tx = self.pool.begin().await?;
        claim_stock_gate(&mut tx).await?;

        let inserted = insert_lot(&mut tx, lot, now).await?;
        insert_movement(
            &mut tx,
            &NewMovement {
                lot_id: inserted.id,
                kind: MovementKind::Reception,
                delta: inserted.quantity_on_hand,
                quantity_after: inserted.quantity_on_hand,
                reference_id: None,
                user_id,
                created_at: now,
            },
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            lot_id = inserted.id,
            medication_id = inserted.medication_id,
            quantity = inserted.quantity_on_hand,
            expiration = %inserted.expiration_date,
            "Lot received"
        );
        Ok(inserted)
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn fetch_lot(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Lot>> {
    let lot = sqlx::query_as::<_, Lot>(&format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(lot)
}

pub(crate) async fn fetch_lots_for_medication(
    conn: &mut SqliteConnection,
    medication_id: i64,
) -> DbResult<Vec<Lot>> {
    let lots = sqlx::query_as::<_, Lot>(&format!(
        "SELECT {LOT_COLUMNS} FROM lots WHERE medication_id = ?1 ORDER BY expiration_date, id"
    ))
    .bind(medication_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lots)
}

pub(crate) async fn insert_lot(
    conn: &mut SqliteConnection,
    lot: &NewLot,
    now: DateTime<Utc>,
) -> DbResult<Lot> {
    let inserted = sqlx::query_as::<_, Lot>(&format!(
        r#"
        INSERT INTO lots (
            medication_id, lot_number, expiration_date, quantity_on_hand,
            purchase_price_cents, supplier_id, received_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING {}
        "#,
        LOT_COLUMNS.replace("lots.", "")
    ))
    .bind(lot.medication_id)
    .bind(lot.lot_number.trim())
    .bind(lot.expiration_date)
    .bind(lot.quantity)
    .bind(lot.purchase_price_cents)
    .bind(lot.supplier_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Adds `delta` to a lot unless the result would be negative.
///
/// Returns the new quantity, or `None` when the guard rejected the change
/// (or the lot does not exist).
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    lot_id: i64,
    delta: i64,
) -> DbResult<Option<i64>> {
    let quantity_after: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE lots SET quantity_on_hand = quantity_on_hand + ?2
        WHERE id = ?1 AND quantity_on_hand + ?2 >= 0
        RETURNING quantity_on_hand
        "#,
    )
    .bind(lot_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(quantity_after)
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{date, lot, medication, test_db};

    #[tokio::test]
    async fn test_stock_sums_split_on_expiry() {
        let db = test_db().await;
        let med = medication(&db, "Dafalgan", 5, 210).await;
        lot(&db, med.id, "OLD", date(2024, 1, 4), 7).await;
        lot(&db, med.id, "TODAY", date(2024, 1, 5), 3).await;
        lot(&db, med.id, "NEW", date(2024, 6, 1), 10).await;

        let today = db.clock().today();
        let repo = db.lots();
        assert_eq!(repo.vendable_stock(med.id, today).await.unwrap(), 13);
        assert_eq!(repo.total_stock(med.id).await.unwrap(), 20);

        let fefo: Vec<String> = repo
            .lots_for_allocation(med.id, today)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.lot_number)
            .collect();
        assert_eq!(fefo, vec!["TODAY", "NEW"]);

        let by_med = repo.vendable_stock_by_medication(today).await.unwrap();
        assert_eq!(by_med.get(&med.id), Some(&13));
        assert_eq!(repo.total_stock(9999).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_trims_and_journals() {
        let db = test_db().await;
        let med = medication(&db, "Spasfon", 5, 480).await;
        let received = lot(&db, med.id, "  SP-22  ", date(2024, 9, 1), 12).await;

        assert_eq!(received.lot_number, "SP-22");
        let movements = db.movements().list_for_lot(received.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!((movements[0].delta, movements[0].quantity_after), (12, 12));
    }

    #[tokio::test]
    async fn test_listing_carries_medication_name() {
        let db = test_db().await;
        let med = medication(&db, "Humex Rhume", 5, 690).await;
        lot(&db, med.id, "H1", date(2023, 12, 1), 4).await;

        let expired = db.lots().expired_with_stock(db.clock().today()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].medication_name, "Humex Rhume");

        let json = serde_json::to_value(&expired[0]).unwrap();
        assert_eq!(json["medication_name"], "Humex Rhume");
        assert_eq!(json["lot_number"], "H1");
        assert_eq!(json["quantity_on_hand"], 4);
    }
}
