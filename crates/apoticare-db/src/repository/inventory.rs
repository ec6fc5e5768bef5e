//! # Inventory Session Repository
//!
//! Counting sessions, their count entries, and the single-row session gate.
//!
//! ## Session Gate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  session_gate (id = 1)                                                  │
//! │                                                                         │
//! │   active_session_id = NULL ──start (guarded UPDATE)──► = session id    │
//! │            ▲                                                │           │
//! │            └──────────── complete / cancel ─────────────────┘           │
//! │                                                                         │
//! │  The guarded UPDATE only matches while the gate is empty, so two       │
//! │  racing starts cannot both claim it. The partial unique index on       │
//! │  inventory_sessions(status) backs this up at the schema level.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use apoticare_core::{CountEntry, InventorySession, SessionStatus, VarianceReason};

const SESSION_COLUMNS: &str = "id, started_at, ended_at, status, operator_id, notes";

const ENTRY_COLUMNS: &str = r#"
    id, session_id, lot_id, theoretical_quantity, physical_quantity,
    variance, reason, comment, counted_at
"#;

/// A count about to be recorded (or re-recorded) for one lot.
#[derive(Debug, Clone)]
pub(crate) struct NewCountEntry<'a> {
    pub session_id: i64,
    pub lot_id: i64,
    pub theoretical_quantity: i64,
    pub physical_quantity: i64,
    pub variance: i64,
    pub reason: Option<VarianceReason>,
    pub comment: Option<&'a str>,
    pub counted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    pub async fn get_session(&self, id: i64) -> DbResult<Option<InventorySession>> {
        let mut conn = self.pool.acquire().await?;
        fetch_session(&mut conn, id).await
    }

    /// The session currently holding the gate, if any.
    pub async fn current_session(&self) -> DbResult<Option<InventorySession>> {
        let session = sqlx::query_as::<_, InventorySession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM inventory_sessions
            WHERE id = (SELECT active_session_id FROM session_gate WHERE id = 1)
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Most recent sessions first.
    pub async fn list_sessions(&self, limit: i64) -> DbResult<Vec<InventorySession>> {
        let sessions = sqlx::query_as::<_, InventorySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM inventory_sessions ORDER BY started_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Count entries of a session in the order they were first recorded.
    pub async fn entries(&self, session_id: i64) -> DbResult<Vec<CountEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entries(&mut conn, session_id).await
    }

    pub async fn entry(&self, session_id: i64, lot_id: i64) -> DbResult<Option<CountEntry>> {
        let entry = sqlx::query_as::<_, CountEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM count_entries WHERE session_id = ?1 AND lot_id = ?2"
        ))
        .bind(session_id)
        .bind(lot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    id: i64,
) -> DbResult<Option<InventorySession>> {
    let session = sqlx::query_as::<_, InventorySession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM inventory_sessions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}

pub(crate) async fn fetch_entries(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> DbResult<Vec<CountEntry>> {
    let entries = sqlx::query_as::<_, CountEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM count_entries WHERE session_id = ?1 ORDER BY id"
    ))
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}

/// Session id currently holding the gate.
pub(crate) async fn active_session_id(conn: &mut SqliteConnection) -> DbResult<Option<i64>> {
    let active: Option<i64> =
        sqlx::query_scalar("SELECT active_session_id FROM session_gate WHERE id = 1")
            .fetch_one(&mut *conn)
            .await?;

    Ok(active)
}

pub(crate) async fn insert_session(
    conn: &mut SqliteConnection,
    operator_id: i64,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<InventorySession> {
    let session = sqlx::query_as::<_, InventorySession>(&format!(
        r#"
        INSERT INTO inventory_sessions (started_at, ended_at, status, operator_id, notes)
        VALUES (?1, NULL, ?2, ?3, ?4)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(now)
    .bind(SessionStatus::InProgress)
    .bind(operator_id)
    .bind(notes)
    .fetch_one(&mut *conn)
    .await?;

    Ok(session)
}

/// Points the gate at `session_id` if it is empty. Returns whether it did.
pub(crate) async fn claim_session_gate(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE session_gate SET active_session_id = ?1 WHERE id = 1 AND active_session_id IS NULL",
    )
    .bind(session_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Empties the gate if `session_id` holds it.
pub(crate) async fn release_session_gate(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE session_gate SET active_session_id = NULL WHERE id = 1 AND active_session_id = ?1")
        .bind(session_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Inserts the entry, or overwrites the previous count of that lot.
pub(crate) async fn upsert_entry(
    conn: &mut SqliteConnection,
    entry: &NewCountEntry<'_>,
) -> DbResult<CountEntry> {
    let saved = sqlx::query_as::<_, CountEntry>(&format!(
        r#"
        INSERT INTO count_entries (
            session_id, lot_id, theoretical_quantity, physical_quantity,
            variance, reason, comment, counted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (session_id, lot_id) DO UPDATE SET
            theoretical_quantity = excluded.theoretical_quantity,
            physical_quantity    = excluded.physical_quantity,
            variance             = excluded.variance,
            reason               = excluded.reason,
            comment              = excluded.comment,
            counted_at           = excluded.counted_at
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(entry.session_id)
    .bind(entry.lot_id)
    .bind(entry.theoretical_quantity)
    .bind(entry.physical_quantity)
    .bind(entry.variance)
    .bind(entry.reason)
    .bind(entry.comment)
    .bind(entry.counted_at)
    .fetch_one(&mut *conn)
    .await?;

    debug!(
        session_id = saved.session_id,
        lot_id = saved.lot_id,
        variance = saved.variance,
        "Count entry saved"
    );
    Ok(saved)
}

pub(crate) async fn delete_entries(conn: &mut SqliteConnection, session_id: i64) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM count_entries WHERE session_id = ?1")
        .bind(session_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Moves an in-progress session to a terminal status.
///
/// Returns `None` when the session was no longer in progress.
pub(crate) async fn finish_session(
    conn: &mut SqliteConnection,
    session_id: i64,
    status: SessionStatus,
    now: DateTime<Utc>,
) -> DbResult<Option<InventorySession>> {
    let session = sqlx::query_as::<_, InventorySession>(&format!(
        r#"
        UPDATE inventory_sessions SET status = ?2, ended_at = ?3
        WHERE id = ?1 AND status = 'in_progress'
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(status)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}
