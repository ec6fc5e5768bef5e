//! # Medication Repository
//!
//! Read access to the catalog, plus registration for seeding and tests.
//! Editing thresholds, prices and the active flag belongs to catalog
//! management and lives outside the ledger.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use apoticare_core::{Medication, NewMedication};

const MEDICATION_COLUMNS: &str = r#"
    id, commercial_name, active_ingredient, reorder_threshold,
    unit_price_cents, prescription_required, is_active, created_at
"#;

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct MedicationRepository {
    pool: SqlitePool,
}

impl MedicationRepository {
    /// Creates a new MedicationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MedicationRepository { pool }
    }

    /// Gets a medication by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Medication>> {
        let mut conn = self.pool.acquire().await?;
        fetch_medication(&mut conn, id).await
    }

    /// Active medications, by name. Forecasting and alerts iterate these.
    pub async fn list_active(&self) -> DbResult<Vec<Medication>> {
        let medications = sqlx::query_as::<_, Medication>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications WHERE is_active = 1 ORDER BY commercial_name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = medications.len(), "Listed active medications");
        Ok(medications)
    }

    /// Every medication, active or not.
    pub async fn list_all(&self) -> DbResult<Vec<Medication>> {
        let medications = sqlx::query_as::<_, Medication>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications ORDER BY commercial_name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(medications)
    }

    /// Case-insensitive match on commercial name or active ingredient.
    pub async fn search(&self, query: &str, limit: i64) -> DbResult<Vec<Medication>> {
        let pattern = format!("%{}%", query.trim());

        let medications = sqlx::query_as::<_, Medication>(&format!(
            r#"
            SELECT {MEDICATION_COLUMNS} FROM medications
            WHERE commercial_name LIKE ?1 OR active_ingredient LIKE ?1
            ORDER BY commercial_name, id
            LIMIT ?2
            "#
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(medications)
    }

    /// Registers a medication. Input is validated and the threshold resolved
    /// by the caller.
    pub async fn insert(
        &self,
        medication: &NewMedication,
        reorder_threshold: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Medication> {
        let inserted = sqlx::query_as::<_, Medication>(&format!(
            r#"
            INSERT INTO medications (
                commercial_name, active_ingredient, reorder_threshold,
                unit_price_cents, prescription_required, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            RETURNING {MEDICATION_COLUMNS}
            "#
        ))
        .bind(medication.commercial_name.trim())
        .bind(medication.active_ingredient.trim())
        .bind(reorder_threshold)
        .bind(medication.unit_price_cents)
        .bind(medication.prescription_required)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!(id = inserted.id, name = %inserted.commercial_name, "Medication registered");
        Ok(inserted)
    }

    /// Deactivates a medication; its lots stay on the ledger.
    pub async fn deactivate(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE medications SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medication", id));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-scoped queries
// =============================================================================

pub(crate) async fn fetch_medication(
    conn: &mut SqliteConnection,
    id: i64,
) -> DbResult<Option<Medication>> {
    let medication = sqlx::query_as::<_, Medication>(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(medication)
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{medication, test_db};
    use crate::error::DbError;

    #[tokio::test]
    async fn test_search_and_deactivate() {
        let db = test_db().await;
        let doliprane = medication(&db, "Doliprane 500mg", 10, 190).await;
        medication(&db, "Advil", 10, 390).await;

        let repo = db.medications();
        let found = repo.search("doli", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, doliprane.id);

        // matches the active ingredient too
        assert_eq!(repo.search("paracetamol", 10).await.unwrap().len(), 2);

        repo.deactivate(doliprane.id).await.unwrap();
        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);

        let err = repo.deactivate(4242).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
