//! # Repository Module
//!
//! SQL access for every ledger entity family.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways Into a Repository                           │
//! │                                                                         │
//! │  Reads from the presentation layer                                     │
//! │       │  db.lots().vendable_stock(med_id, today)                       │
//! │       ▼                                                                 │
//! │  LotRepository (holds the pool)                                        │
//! │                                                                         │
//! │  Writes from an engine, inside its transaction                         │
//! │       │  lot::apply_delta(&mut tx, lot_id, -5)                         │
//! │       ▼                                                                 │
//! │  pub(crate) fn(conn: &mut SqliteConnection, ...)                       │
//! │                                                                         │
//! │  Pool methods never run inside a transaction: an in-memory pool has    │
//! │  a single connection and would wait on itself.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MedicationRepository`] - Catalog reads and registration
//! - [`LotRepository`] - FEFO queries, stock sums, receptions
//! - [`SaleRepository`] - Sale history and consumption
//! - [`ReturnRepository`] - Customer returns
//! - [`InventoryRepository`] - Counting sessions and entries
//! - [`MovementRepository`] - Stock movement journal
//! - [`PurchaseOrderRepository`] - Supplier orders and their lines

pub mod inventory;
pub mod lot;
pub mod medication;
pub mod movement;
pub mod order;
pub mod returns;
pub mod sale;

pub use inventory::InventoryRepository;
pub use lot::{LotListing, LotRepository};
pub use medication::MedicationRepository;
pub use movement::MovementRepository;
pub use order::PurchaseOrderRepository;
pub use returns::ReturnRepository;
pub use sale::SaleRepository;

use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Takes the database write lock for the current transaction.
///
/// Must be the first statement of every stock-mutating transaction so that
/// the reads that follow see a state no other writer can change before commit.
pub(crate) async fn claim_stock_gate(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("UPDATE stock_gate SET version = version + 1 WHERE id = 1")
        .execute(&mut *conn)
        .await?;

    Ok(())
}
