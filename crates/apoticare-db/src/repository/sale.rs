//! # Sale Repository
//!
//! Database operations for sales and sale lines.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  A sale is written exactly once, by the allocation engine:             │
//! │                                                                         │
//! │  BEGIN ─► claim stock gate ─► plan FEFO ─► insert_sale()               │
//! │                                              │                          │
//! │                                              ├── insert_line() × n     │
//! │                                              └── lot decrements × n    │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  After commit the header and its lines are immutable. Returns are      │
//! │  separate rows and never rewrite the sale total.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use apoticare_core::{Sale, SaleLine, SaleReceipt};

const SALE_COLUMNS: &str =
    "id, sold_at, total_cents, prescription, prescription_number, seller_id, notes";

const LINE_COLUMNS: &str = "id, sale_id, lot_id, medication_id, quantity, unit_price_cents";

/// Header fields for a sale about to be inserted.
#[derive(Debug, Clone)]
pub(crate) struct NewSale<'a> {
    pub sold_at: DateTime<Utc>,
    pub total_cents: i64,
    pub prescription: bool,
    pub prescription_number: Option<&'a str>,
    pub seller_id: i64,
    pub notes: Option<&'a str>,
}

/// Repository for sale reads. Writes go through the allocation engine.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale header by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale(&mut conn, id).await
    }

    /// Gets a sale with all its lines.
    pub async fn get_with_lines(&self, id: i64) -> DbResult<SaleReceipt> {
        let mut conn = self.pool.acquire().await?;

        let sale = fetch_sale(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;
        let lines = fetch_lines(&mut conn, id).await?;

        Ok(SaleReceipt { sale, lines })
    }

    /// Lines of a sale, in insertion order.
    pub async fn lines_for_sale(&self, sale_id: i64) -> DbResult<Vec<SaleLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, sale_id).await
    }

    /// Sales in `[from, to)`, most recent first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE sold_at >= ?1 AND sold_at < ?2
            ORDER BY sold_at DESC, id DESC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = sales.len(), "Listed sales in range");
        Ok(sales)
    }

    /// A seller's most recent sales.
    pub async fn list_by_seller(&self, seller_id: i64, limit: i64) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE seller_id = ?1
            ORDER BY sold_at DESC, id DESC
            LIMIT ?2
            "#
        ))
        .bind(seller_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Prescription sales in `[from, to)`, for the dispensing register.
    pub async fn list_prescription_sales(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE prescription = 1 AND sold_at >= ?1 AND sold_at < ?2
            ORDER BY sold_at, id
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Units of a medication sold since `since`. Returns are not netted out.
    pub async fn units_sold_since(&self, medication_id: i64, since: DateTime<Utc>) -> DbResult<i64> {
        let units: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(sale_lines.quantity), 0)
            FROM sale_lines JOIN sales ON sales.id = sale_lines.sale_id
            WHERE sale_lines.medication_id = ?1 AND sales.sold_at >= ?2
            "#,
        )
        .bind(medication_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(units)
    }

    /// Units sold since `since` for every medication that sold any.
    pub async fn units_sold_by_medication_since(
        &self,
        since: DateTime<Utc>,
    ) -> DbResult<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT sale_lines.medication_id, COALESCE(SUM(sale_lines.quantity), 0)
            FROM sale_lines JOIN sales ON sales.id = sale_lines.sale_id
            WHERE sales.sold_at >= ?1
            GROUP BY sale_lines.medication_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn fetch_sale(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

pub(crate) async fn fetch_lines(
    conn: &mut SqliteConnection,
    sale_id: i64,
) -> DbResult<Vec<SaleLine>> {
    let lines = sqlx::query_as::<_, SaleLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY id"
    ))
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

/// The line of `sale_id` that drew from `lot_id`, if any.
pub(crate) async fn fetch_line(
    conn: &mut SqliteConnection,
    sale_id: i64,
    lot_id: i64,
) -> DbResult<Option<SaleLine>> {
    let line = sqlx::query_as::<_, SaleLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 AND lot_id = ?2"
    ))
    .bind(sale_id)
    .bind(lot_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(line)
}

pub(crate) async fn insert_sale(conn: &mut SqliteConnection, sale: &NewSale<'_>) -> DbResult<Sale> {
    let inserted = sqlx::query_as::<_, Sale>(&format!(
        r#"
        INSERT INTO sales (sold_at, total_cents, prescription, prescription_number, seller_id, notes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING {SALE_COLUMNS}
        "#
    ))
    .bind(sale.sold_at)
    .bind(sale.total_cents)
    .bind(sale.prescription)
    .bind(sale.prescription_number)
    .bind(sale.seller_id)
    .bind(sale.notes)
    .fetch_one(&mut *conn)
    .await?;

    debug!(sale_id = inserted.id, total_cents = inserted.total_cents, "Sale header inserted");
    Ok(inserted)
}

pub(crate) async fn insert_line(
    conn: &mut SqliteConnection,
    sale_id: i64,
    lot_id: i64,
    medication_id: i64,
    quantity: i64,
    unit_price_cents: i64,
) -> DbResult<SaleLine> {
    let line = sqlx::query_as::<_, SaleLine>(&format!(
        r#"
        INSERT INTO sale_lines (sale_id, lot_id, medication_id, quantity, unit_price_cents)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {LINE_COLUMNS}
        "#
    ))
    .bind(sale_id)
    .bind(lot_id)
    .bind(medication_id)
    .bind(quantity)
    .bind(unit_price_cents)
    .fetch_one(&mut *conn)
    .await?;

    Ok(line)
}
