//! # Stock Read Scope
//!
//! A read-through cache that lives for one request or render cycle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let scope = db.read_scope();          today pinned once               │
//! │                                                                         │
//! │  scope.vendable_stock(7) ──miss──► SQL ──► cache[7] = 42               │
//! │  scope.vendable_stock(7) ──hit───► 42                                  │
//! │                                                                         │
//! │  drop(scope)                           nothing outlives the cycle      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are a snapshot: a sale committed while the scope is alive is not
//! reflected until a new scope is taken (or [`StockReadScope::invalidate`]).
//! There is no process-wide cache.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{LotRepository, MedicationRepository, SaleRepository};
use apoticare_core::{Clock, Medication};

#[derive(Debug, Default)]
struct ScopeCache {
    active_medications: Option<Vec<Medication>>,
    vendable: HashMap<i64, i64>,
    total: HashMap<i64, i64>,
    units_sold: HashMap<(i64, DateTime<Utc>), i64>,
}

/// Request-scoped view of stock figures.
///
/// Cloning shares the cache; take a fresh scope from
/// [`Database::read_scope`](crate::Database::read_scope) per cycle.
#[derive(Debug, Clone)]
pub struct StockReadScope {
    pool: SqlitePool,
    now: DateTime<Utc>,
    cache: Arc<Mutex<ScopeCache>>,
}

impl StockReadScope {
    /// Creates a scope. The clock is read once; every figure uses that instant.
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        StockReadScope {
            pool,
            now: clock.now(),
            cache: Arc::new(Mutex::new(ScopeCache::default())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn lots(&self) -> LotRepository {
        LotRepository::new(self.pool.clone())
    }

    /// Active medications, loaded once per scope.
    pub async fn active_medications(&self) -> DbResult<Vec<Medication>> {
        if let Some(medications) = &self.cache.lock().await.active_medications {
            return Ok(medications.clone());
        }

        let medications = MedicationRepository::new(self.pool.clone()).list_active().await?;
        self.cache.lock().await.active_medications = Some(medications.clone());
        Ok(medications)
    }

    pub async fn medication(&self, medication_id: i64) -> DbResult<Option<Medication>> {
        if let Some(found) = self
            .cache
            .lock()
            .await
            .active_medications
            .as_ref()
            .and_then(|all| all.iter().find(|m| m.id == medication_id))
        {
            return Ok(Some(found.clone()));
        }

        MedicationRepository::new(self.pool.clone())
            .get_by_id(medication_id)
            .await
    }

    /// Σ quantity over unexpired lots, as of the scope's day.
    pub async fn vendable_stock(&self, medication_id: i64) -> DbResult<i64> {
        if let Some(&vendable) = self.cache.lock().await.vendable.get(&medication_id) {
            return Ok(vendable);
        }

        let vendable = self.lots().vendable_stock(medication_id, self.today()).await?;
        debug!(medication_id, vendable, "Cached vendable stock");
        self.cache.lock().await.vendable.insert(medication_id, vendable);
        Ok(vendable)
    }

    pub async fn total_stock(&self, medication_id: i64) -> DbResult<i64> {
        if let Some(&total) = self.cache.lock().await.total.get(&medication_id) {
            return Ok(total);
        }

        let total = self.lots().total_stock(medication_id).await?;
        self.cache.lock().await.total.insert(medication_id, total);
        Ok(total)
    }

    /// Units of a medication sold since `since`.
    pub async fn units_sold_since(&self, medication_id: i64, since: DateTime<Utc>) -> DbResult<i64> {
        if let Some(&units) = self.cache.lock().await.units_sold.get(&(medication_id, since)) {
            return Ok(units);
        }

        let units = SaleRepository::new(self.pool.clone())
            .units_sold_since(medication_id, since)
            .await?;
        self.cache.lock().await.units_sold.insert((medication_id, since), units);
        Ok(units)
    }

    /// Drops every cached figure.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = ScopeCache::default();
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{quantity, test_db, three_lot_fixture};
    use apoticare_core::{SaleLineRequest, SaleRequest};

    #[tokio::test]
    async fn test_scope_is_a_snapshot() {
        let db = test_db().await;
        let (med, l1, _, _) = three_lot_fixture(&db).await;

        let scope = db.read_scope();
        assert_eq!(scope.vendable_stock(med.id).await.unwrap(), 35);
        assert_eq!(scope.total_stock(med.id).await.unwrap(), 35);

        db.allocation()
            .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(med.id, 5)], 1))
            .await
            .unwrap();
        assert_eq!(quantity(&db, l1.id).await, 0);

        // same scope, same answer
        assert_eq!(scope.vendable_stock(med.id).await.unwrap(), 35);

        let fresh = db.read_scope();
        assert_eq!(fresh.vendable_stock(med.id).await.unwrap(), 30);

        scope.invalidate().await;
        assert_eq!(scope.vendable_stock(med.id).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_cached_reads_do_not_wait_on_pending_queries() {
        let db = test_db().await;
        let (med, _, _, _) = three_lot_fixture(&db).await;
        let scope = db.read_scope();
        let other = scope.clone();
        assert_eq!(scope.total_stock(med.id).await.unwrap(), 35);

        // the in-memory pool has one connection; hold it so the miss below waits
        let held = db.pool().acquire().await.unwrap();
        let (vendable, total) = tokio::join!(scope.vendable_stock(med.id), async {
            let total = other.total_stock(med.id).await;
            drop(held);
            total
        });

        assert_eq!(total.unwrap(), 35);
        assert_eq!(vendable.unwrap(), 35);
    }

    #[tokio::test]
    async fn test_medications_loaded_once() {
        let db = test_db().await;
        let (med, _, _, _) = three_lot_fixture(&db).await;
        let scope = db.read_scope();

        let all = scope.active_medications().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(scope.medication(med.id).await.unwrap().unwrap().id, med.id);
        assert!(scope.medication(999).await.unwrap().is_none());
    }
}
