//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  LedgerConfig::load() / DbConfig::new(path)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├──► repositories (reads, one statement each)                    │
//! │       └──► engines (one transaction per operation)                     │
//! │                                                                         │
//! │  Readers run in parallel. Writers queue on the SQLite write lock and   │
//! │  wait up to `busy_timeout` before failing with DbError::Busy.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Readers don't block writers
//! - Writers don't block readers
//! - Better crash recovery

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use apoticare_core::alerts::{registration_threshold, AlertSettings};
use apoticare_core::forecast::ForecastSettings;
use apoticare_core::validation::validate_new_medication;
use apoticare_core::{Clock, Medication, NewMedication};

use crate::config::LedgerConfig;
use crate::engine::{
    AlertEvaluator, AllocationEngine, LedgerResult, LotInventory, PurchaseOrderEngine,
    ReconciliationEngine, ReplenishmentForecaster, ReturnEngine, StockReadScope,
};
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    InventoryRepository, LotRepository, MedicationRepository, MovementRepository,
    PurchaseOrderRepository, ReturnRepository, SaleRepository,
};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/srv/pharmacy/ledger.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a statement waits for the write lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the write-lock wait.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and engine access.
///
/// Cheap to clone: the pool is reference-counted and the settings are `Copy`.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
///
/// let receipt = db.allocation().create_sale(request).await?;
/// let alerts = db.alerts().low_stock_alerts().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
    clock: Clock,
    alert_settings: AlertSettings,
    forecast_settings: ForecastSettings,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout so writers queue instead of failing
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout));

        if config.is_in_memory() {
            // Closing the only connection would drop the whole database
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            clock: Clock::System,
            alert_settings: AlertSettings::default(),
            forecast_settings: ForecastSettings::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Opens the database described by a loaded [`LedgerConfig`] and carries
    /// its alert and forecast settings.
    pub async fn open(config: &LedgerConfig) -> DbResult<Self> {
        let db = Database::new(config.db_config()?).await?;
        Ok(db.with_settings(config.alerts, config.forecast))
    }

    /// Replaces the clock. Tests pin "today" with [`Clock::Fixed`].
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces alert and forecast settings.
    pub fn with_settings(mut self, alerts: AlertSettings, forecast: ForecastSettings) -> Self {
        self.alert_settings = alerts;
        self.forecast_settings = forecast;
        self
    }

    /// Runs database migrations.
    ///
    /// Idempotent: safe to run multiple times.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns `(embedded, applied)` migration counts.
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn alert_settings(&self) -> AlertSettings {
        self.alert_settings
    }

    pub fn forecast_settings(&self) -> ForecastSettings {
        self.forecast_settings
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    pub fn medications(&self) -> MedicationRepository {
        MedicationRepository::new(self.pool.clone())
    }

    pub fn lots(&self) -> LotRepository {
        LotRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn returns(&self) -> ReturnRepository {
        ReturnRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    pub fn movements(&self) -> MovementRepository {
        MovementRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> PurchaseOrderRepository {
        PurchaseOrderRepository::new(self.pool.clone())
    }

    /// Registers a catalog entry. A missing threshold takes the configured
    /// `default_low_stock_threshold`; the stored value is what alerts compare to.
    pub async fn register_medication(&self, medication: &NewMedication) -> LedgerResult<Medication> {
        validate_new_medication(medication)?;
        let threshold = registration_threshold(medication, &self.alert_settings);

        Ok(self
            .medications()
            .insert(medication, threshold, self.clock.now())
            .await?)
    }

    // =========================================================================
    // Engines
    // =========================================================================

    /// Lot-level stock queries and single-lot mutations.
    pub fn lot_inventory(&self) -> LotInventory {
        LotInventory::new(self.pool.clone(), self.clock)
    }

    /// FEFO sale processing.
    pub fn allocation(&self) -> AllocationEngine {
        AllocationEngine::new(self.pool.clone(), self.clock)
    }

    /// Customer returns and reintegration.
    pub fn return_engine(&self) -> ReturnEngine {
        ReturnEngine::new(self.pool.clone(), self.clock)
    }

    /// Supplier orders and their reception.
    pub fn purchasing(&self) -> PurchaseOrderEngine {
        PurchaseOrderEngine::new(self.pool.clone(), self.clock)
    }

    /// Inventory counting sessions.
    pub fn reconciliation(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(self.pool.clone(), self.clock)
    }

    /// Depletion and reorder predictions.
    pub fn forecaster(&self) -> ReplenishmentForecaster {
        ReplenishmentForecaster::new(self.read_scope(), self.forecast_settings)
    }

    /// Low-stock, expiration and expired-lot alerts.
    pub fn alerts(&self) -> AlertEvaluator {
        AlertEvaluator::new(self.read_scope(), self.alert_settings)
    }

    /// A fresh read-through cache for one request or render cycle.
    pub fn read_scope(&self) -> StockReadScope {
        StockReadScope::new(self.pool.clone(), self.clock)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository and engine operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);

        let (total, applied) = db.migration_status().await.unwrap();
        assert_eq!(total, applied);
        assert!(total >= 2);
    }

    #[tokio::test]
    async fn test_gate_rows_seeded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let gates: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM stock_gate) + (SELECT COUNT(*) FROM session_gate)",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(gates, 2);
    }

    #[tokio::test]
    async fn test_closed_database_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
