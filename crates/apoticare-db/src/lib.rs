//! # apoticare-db: Stock Ledger Store & Engines
//!
//! SQLite storage for the pharmacy stock ledger, and the engines that move
//! stock through it in transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Stock Ledger Data Flow                            │
//! │                                                                         │
//! │  Caller (counter UI, back office, seed binary)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   apoticare-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Engines     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine/)    │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ Allocation    │───►│ LotRepo       │    │ 001_init.sql │  │   │
//! │  │   │ Returns       │    │ SaleRepo      │    │              │  │   │
//! │  │   │ Reconciliation│    │ MovementRepo  │    │ 002_orders   │  │   │
//! │  │   │ PurchaseOrders│    │ OrderRepo ... │    │              │  │   │
//! │  │   │ Forecast/Alert│    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            │                   │                               │   │
//! │  │            └─────── Database (pool.rs) + LedgerConfig ─────────│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pure rules (FEFO planning, return decisions, variance, forecasting
//! math, alert tiers) live in `apoticare-core`. This crate owns the I/O and
//! the transaction boundaries around them.
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration file and defaults
//! - [`pool`] - Connection pool, clock and engine accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage error types
//! - [`repository`] - Row-level reads and writes
//! - [`engine`] - Sales, returns, inventory sessions, purchase orders, forecasts, alerts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apoticare_db::{Database, LedgerConfig};
//! use apoticare_core::{SaleLineRequest, SaleRequest};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::open(&config).await?;
//!
//! let receipt = db
//!     .allocation()
//!     .create_sale(&SaleRequest::new(vec![SaleLineRequest::new(med_id, 2)], seller_id))
//!     .await?;
//!
//! let alerts = db.alerts().low_stock_alerts().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use engine::{
    AlertEvaluator, AllocationEngine, LedgerError, LedgerResult, LotInventory,
    PurchaseOrderEngine, ReconciliationEngine, ReplenishmentForecaster, ReturnEngine,
    StockReadScope,
};

// Repository re-exports for convenience
pub use repository::{
    InventoryRepository, LotListing, LotRepository, MedicationRepository, MovementRepository,
    PurchaseOrderRepository, ReturnRepository, SaleRepository,
};
