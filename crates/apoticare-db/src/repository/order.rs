//! # Purchase Order Repository
//!
//! Supplier orders and their lines.
//!
//! ## Status Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE purchase_orders SET status = to                                 │
//! │  WHERE id = ? AND status IN (from...)                                   │
//! │                                                                         │
//! │  row returned  → transition applied                                     │
//! │  no row        → order missing or already moved on; the engine reads    │
//! │                  it again to report which                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use apoticare_core::{NewOrderLine, OrderLine, OrderStatus, PurchaseOrder};

const ORDER_COLUMNS: &str = r#"
    purchase_orders.id, purchase_orders.supplier_id, purchase_orders.status,
    purchase_orders.notes, purchase_orders.created_by, purchase_orders.created_at,
    purchase_orders.ordered_at, purchase_orders.received_at
"#;

const LINE_COLUMNS: &str =
    "id, order_id, medication_id, quantity_ordered, quantity_received, unit_cost_cents";

#[derive(Debug, Clone)]
pub struct PurchaseOrderRepository {
    pool: SqlitePool,
}

impl PurchaseOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseOrderRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PurchaseOrder>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    /// Lines of an order in entry order.
    pub async fn lines(&self, order_id: i64) -> DbResult<Vec<OrderLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_lines(&mut conn, order_id).await
    }

    /// Orders in a status, newest first.
    pub async fn list_by_status(&self, status: OrderStatus) -> DbResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM purchase_orders
            WHERE status = ?1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders placed with one supplier, newest first.
    pub async fn list_by_supplier(&self, supplier_id: i64) -> DbResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM purchase_orders
            WHERE supplier_id = ?1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders carrying at least one line for the medication, newest first.
    pub async fn list_for_medication(&self, medication_id: i64) -> DbResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            SELECT DISTINCT {ORDER_COLUMNS} FROM purchase_orders
            JOIN order_lines ON order_lines.order_id = purchase_orders.id
            WHERE order_lines.medication_id = ?1
            ORDER BY purchase_orders.created_at DESC, purchase_orders.id DESC
            "#
        ))
        .bind(medication_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Units ordered and not yet received for a medication.
    pub async fn quantity_on_order(&self, medication_id: i64) -> DbResult<i64> {
        let pending: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(order_lines.quantity_ordered), 0) FROM order_lines
            JOIN purchase_orders ON purchase_orders.id = order_lines.order_id
            WHERE order_lines.medication_id = ?1 AND purchase_orders.status = 'ordered'
            "#,
        )
        .bind(medication_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(pending)
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn fetch_order(
    conn: &mut SqliteConnection,
    id: i64,
) -> DbResult<Option<PurchaseOrder>> {
    let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
        "SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(order)
}

pub(crate) async fn fetch_order_lines(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> DbResult<Vec<OrderLine>> {
    let lines = sqlx::query_as::<_, OrderLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

pub(crate) async fn insert_order(
    conn: &mut SqliteConnection,
    supplier_id: i64,
    notes: Option<&str>,
    created_by: i64,
    now: DateTime<Utc>,
) -> DbResult<PurchaseOrder> {
    let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
        r#"
        INSERT INTO purchase_orders (supplier_id, status, notes, created_by, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {}
        "#,
        ORDER_COLUMNS.replace("purchase_orders.", "")
    ))
    .bind(supplier_id)
    .bind(OrderStatus::Draft)
    .bind(notes)
    .bind(created_by)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(order)
}

pub(crate) async fn insert_order_line(
    conn: &mut SqliteConnection,
    order_id: i64,
    line: &NewOrderLine,
) -> DbResult<OrderLine> {
    let inserted = sqlx::query_as::<_, OrderLine>(&format!(
        r#"
        INSERT INTO order_lines (order_id, medication_id, quantity_ordered, unit_cost_cents)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING {LINE_COLUMNS}
        "#
    ))
    .bind(order_id)
    .bind(line.medication_id)
    .bind(line.quantity)
    .bind(line.unit_cost_cents)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Moves an order from one of `from` to `to`, stamping the matching date.
///
/// Returns `None` when the order is missing or in none of `from`.
pub(crate) async fn transition_order(
    conn: &mut SqliteConnection,
    order_id: i64,
    from: &[OrderStatus],
    to: OrderStatus,
    now: DateTime<Utc>,
) -> DbResult<Option<PurchaseOrder>> {
    let placeholders = (0..from.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        r#"
        UPDATE purchase_orders SET
            status      = ?2,
            ordered_at  = CASE WHEN ?2 = 'ordered'  THEN ?3 ELSE ordered_at  END,
            received_at = CASE WHEN ?2 = 'received' THEN ?3 ELSE received_at END
        WHERE id = ?1 AND status IN ({placeholders})
        RETURNING {}
        "#,
        ORDER_COLUMNS.replace("purchase_orders.", "")
    );

    let mut query = sqlx::query_as::<_, PurchaseOrder>(&sql)
        .bind(order_id)
        .bind(to)
        .bind(now);
    for status in from {
        query = query.bind(*status);
    }

    let order = query.fetch_optional(&mut *conn).await?;
    if let Some(order) = &order {
        debug!(order_id, status = %order.status, "Order status changed");
    }
    Ok(order)
}

/// Records what arrived for one line.
pub(crate) async fn set_quantity_received(
    conn: &mut SqliteConnection,
    line_id: i64,
    quantity: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE order_lines SET quantity_received = ?2 WHERE id = ?1")
        .bind(line_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Purchase price of the most recently received lot of a medication.
pub(crate) async fn last_unit_cost(
    conn: &mut SqliteConnection,
    medication_id: i64,
) -> DbResult<Option<i64>> {
    let cost: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT purchase_price_cents FROM lots
        WHERE medication_id = ?1
        ORDER BY received_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(medication_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(cost)
}
