//! # Stock Movement Journal
//!
//! Append-only. Every lot quantity change writes one row in the same
//! transaction, so replaying a lot's movements reproduces its quantity.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use apoticare_core::{MovementKind, StockMovement};

const MOVEMENT_COLUMNS: &str =
    "id, lot_id, kind, delta, quantity_after, reference_id, user_id, created_at";

#[derive(Debug, Clone)]
pub(crate) struct NewMovement {
    pub lot_id: i64,
    pub kind: MovementKind,
    pub delta: i64,
    pub quantity_after: i64,
    pub reference_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// A lot's movements in the order they were applied.
    pub async fn list_for_lot(&self, lot_id: i64) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE lot_id = ?1 ORDER BY id"
        ))
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements recorded in `[from, to)`, in application order.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS} FROM stock_movements
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY id
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements tied to one sale, return, session or purchase order.
    pub async fn list_for_reference(
        &self,
        kind: MovementKind,
        reference_id: i64,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS} FROM stock_movements
            WHERE kind = ?1 AND reference_id = ?2
            ORDER BY id
            "#
        ))
        .bind(kind)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &NewMovement,
) -> DbResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stock_movements (
            lot_id, kind, delta, quantity_after, reference_id, user_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING id
        "#,
    )
    .bind(movement.lot_id)
    .bind(movement.kind)
    .bind(movement.delta)
    .bind(movement.quantity_after)
    .bind(movement.reference_id)
    .bind(movement.user_id)
    .bind(movement.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{quantity, test_db, three_lot_fixture};
    use apoticare_core::{MovementKind, SaleLineRequest, SaleRequest};

    #[tokio::test]
    async fn test_journal_replays_to_quantity() {
        let db = test_db().await;
        let (med, _, l2, _) = three_lot_fixture(&db).await;

        let receipt = db
            .allocation()
            .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(med.id, 8)], 2))
            .await
            .unwrap();
        db.lot_inventory().increment(l2.id, 4, Some(2)).await.unwrap();
        db.lot_inventory().set_quantity(l2.id, 9, Some(2)).await.unwrap();

        let movements = db.movements().list_for_lot(l2.id).await.unwrap();
        let kinds: Vec<MovementKind> = movements.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MovementKind::Reception,
                MovementKind::Sale,
                MovementKind::Regularization,
                MovementKind::Regularization,
            ]
        );

        let replayed: i64 = movements.iter().map(|m| m.delta).sum();
        assert_eq!(replayed, quantity(&db, l2.id).await);
        assert_eq!(movements.last().unwrap().quantity_after, 9);

        // L1 (5) and L2 (3) both drawn by the sale
        let by_sale = db
            .movements()
            .list_for_reference(MovementKind::Sale, receipt.sale.id)
            .await
            .unwrap();
        assert_eq!(by_sale.len(), 2);
        assert_eq!(by_sale.iter().map(|m| m.delta).sum::<i64>(), -8);
    }

    #[tokio::test]
    async fn test_list_between_is_half_open() {
        let db = test_db().await;
        three_lot_fixture(&db).await;
        let now = db.clock().now();

        let all = db
            .movements()
            .list_between(now, now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let none = db
            .movements()
            .list_between(now - chrono::Duration::seconds(1), now)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
