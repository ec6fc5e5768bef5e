//! # Return Repository
//!
//! Customer returns, one row per (sale, lot, registration). The sale they
//! refer to is never edited.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use apoticare_core::{ReturnReason, SaleReturn};

const RETURN_COLUMNS: &str =
    "id, sale_id, lot_id, quantity, reason, reintegrated, comment, user_id, returned_at";

/// Fields of a return about to be inserted.
#[derive(Debug, Clone)]
pub(crate) struct NewReturn<'a> {
    pub sale_id: i64,
    pub lot_id: i64,
    pub quantity: i64,
    pub reason: ReturnReason,
    pub reintegrated: bool,
    pub comment: Option<&'a str>,
    pub user_id: i64,
    pub returned_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<SaleReturn>> {
        let record = sqlx::query_as::<_, SaleReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Every return registered against a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: i64) -> DbResult<Vec<SaleReturn>> {
        let records = sqlx::query_as::<_, SaleReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE sale_id = ?1 ORDER BY id"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Returns registered in `[from, to)`, most recent first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<SaleReturn>> {
        let records = sqlx::query_as::<_, SaleReturn>(&format!(
            r#"
            SELECT {RETURN_COLUMNS} FROM returns
            WHERE returned_at >= ?1 AND returned_at < ?2
            ORDER BY returned_at DESC, id DESC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Units already returned for one (sale, lot) pair.
    pub async fn returned_quantity(&self, sale_id: i64, lot_id: i64) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        returned_quantity(&mut conn, sale_id, lot_id).await
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn returned_quantity(
    conn: &mut SqliteConnection,
    sale_id: i64,
    lot_id: i64,
) -> DbResult<i64> {
    let returned: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM returns WHERE sale_id = ?1 AND lot_id = ?2",
    )
    .bind(sale_id)
    .bind(lot_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(returned)
}

pub(crate) async fn insert_return(
    conn: &mut SqliteConnection,
    record: &NewReturn<'_>,
) -> DbResult<SaleReturn> {
    let inserted = sqlx::query_as::<_, SaleReturn>(&format!(
        r#"
        INSERT INTO returns (
            sale_id, lot_id, quantity, reason, reintegrated, comment, user_id, returned_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING {RETURN_COLUMNS}
        "#
    ))
    .bind(record.sale_id)
    .bind(record.lot_id)
    .bind(record.quantity)
    .bind(record.reason)
    .bind(record.reintegrated)
    .bind(record.comment)
    .bind(record.user_id)
    .bind(record.returned_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}
