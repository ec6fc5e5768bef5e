//! # Demo Pharmacy Seeder
//!
//! Populates a ledger database with a small pharmacy: medications, a few
//! lots each with staggered expirations, and some counter sales so that
//! forecasts and alerts have something to say.
//!
//! ## Usage
//! ```bash
//! # Database from ledger.toml (or the platform default)
//! cargo run -p apoticare-db --bin seed
//!
//! # Specific database file
//! cargo run -p apoticare-db --bin seed -- --db ./data/ledger.db
//! ```
//!
//! ## What Gets Created
//! ```text
//! medication ──┬── lot A  expires in ~20 days   (alerts: Critique/Urgent)
//!              ├── lot B  expires in ~6 months
//!              └── lot C  expires in ~1 year
//! + counter sales drawn FEFO, one of them on prescription
//! + one supplier order drafted from the reorder suggestions, sent
//! ```
//!
//! Seeding is skipped when the database already holds medications.

use std::env;
use std::path::PathBuf;

use chrono::{Days, NaiveDate};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apoticare_core::{NewLot, NewMedication, SaleLineRequest, SaleRequest};
use apoticare_db::{Database, LedgerConfig, LedgerResult};

/// (commercial name, active ingredient, threshold, unit price cents, prescription)
const MEDICATIONS: &[(&str, &str, i64, i64, bool)] = &[
    ("Doliprane 1000mg", "Paracétamol", 20, 250, false),
    ("Efferalgan 500mg", "Paracétamol", 15, 230, false),
    ("Advil 200mg", "Ibuprofène", 15, 390, false),
    ("Spasfon", "Phloroglucinol", 10, 480, false),
    ("Smecta", "Diosmectite", 10, 410, false),
    ("Gaviscon", "Alginate de sodium", 8, 520, false),
    ("Amoxicilline 1g", "Amoxicilline", 12, 690, true),
    ("Ventoline", "Salbutamol", 6, 450, true),
    ("Levothyrox 75µg", "Lévothyroxine", 10, 310, true),
    ("Biafine", "Trolamine", 0, 640, false),
];

/// Days until expiration and received quantity for each seeded lot.
const LOT_PLAN: &[(u64, i64)] = &[(20, 8), (180, 25), (365, 40)];

const SEED_USER: i64 = 1;
const SEED_SUPPLIER: i64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("ApotiCare demo pharmacy seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: from ledger.toml)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = LedgerConfig::load_or_default(None);
    if db_path.is_some() {
        config.database.path = db_path;
    }

    let db = Database::open(&config).await?;
    info!(path = ?config.database.path, "Connected, migrations applied");

    let existing = db.medications().list_all().await?;
    if !existing.is_empty() {
        warn!(
            count = existing.len(),
            "Database already has medications, skipping seed"
        );
        return Ok(());
    }

    let start = std::time::Instant::now();
    let today = db.clock().today();

    let mut medication_ids = Vec::with_capacity(MEDICATIONS.len());
    for (index, medication) in MEDICATIONS.iter().enumerate() {
        let id = seed_medication(&db, index, medication, today).await?;
        medication_ids.push(id);
    }

    let sales = seed_sales(&db, &medication_ids).await?;
    let order_lines = seed_order(&db).await?;

    info!(
        medications = medication_ids.len(),
        lots = medication_ids.len() * LOT_PLAN.len(),
        sales,
        order_lines,
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    let low = db.alerts().low_stock_alerts().await?;
    let expiring = db.alerts().expiration_alerts(None).await?;
    info!(
        low_stock = low.len(),
        expiring = expiring.len(),
        "Alerts on the seeded pharmacy"
    );

    db.close().await;
    Ok(())
}

/// Creates one medication and its lots; returns the medication id.
async fn seed_medication(
    db: &Database,
    index: usize,
    &(name, ingredient, threshold, price, prescription): &(&str, &str, i64, i64, bool),
    today: NaiveDate,
) -> LedgerResult<i64> {
    let medication = db
        .register_medication(&NewMedication {
            commercial_name: name.to_string(),
            active_ingredient: ingredient.to_string(),
            // 0 in the table means "use the configured default"
            reorder_threshold: (threshold > 0).then_some(threshold),
            unit_price_cents: price,
            prescription_required: prescription,
        })
        .await?;

    for (n, &(days, quantity)) in LOT_PLAN.iter().enumerate() {
        // stagger so that not every medication expires on the same day
        let Some(expiration_date) = today.checked_add_days(Days::new(days + index as u64)) else {
            continue;
        };

        db.lot_inventory()
            .receive(
                &NewLot {
                    medication_id: medication.id,
                    lot_number: format!("DEMO-{:02}-{}", index + 1, n + 1),
                    expiration_date,
                    quantity,
                    purchase_price_cents: price * 60 / 100,
                    supplier_id: None,
                },
                Some(SEED_USER),
            )
            .await?;
    }

    Ok(medication.id)
}

/// A handful of counter sales; returns how many were recorded.
async fn seed_sales(db: &Database, medication_ids: &[i64]) -> LedgerResult<usize> {
    let engine = db.allocation();
    let mut recorded = 0;

    for (n, &medication_id) in medication_ids.iter().enumerate() {
        // every other medication sells enough to dip into its second lot
        let quantity = if n % 2 == 0 { 12 } else { 3 };
        let request = SaleRequest::new(
            vec![SaleLineRequest::new(medication_id, quantity)],
            SEED_USER,
        );

        match engine.create_sale(&request).await {
            Ok(_) => recorded += 1,
            Err(e) => warn!(medication_id, error = %e, "Demo sale rejected"),
        }
    }

    // one dispensed on prescription
    if let Some(&medication_id) = medication_ids.get(6) {
        let request = SaleRequest::new(vec![SaleLineRequest::new(medication_id, 2)], SEED_USER)
            .with_prescription(Some("ORD-DEMO-0001".to_string()));
        engine.create_sale(&request).await?;
        recorded += 1;
    }

    Ok(recorded)
}

/// Drafts and sends an order for whatever the forecaster wants restocked.
/// Returns the number of order lines.
async fn seed_order(db: &Database) -> LedgerResult<usize> {
    let suggestions = db.forecaster().reorder_suggestions().await?;
    let purchasing = db.purchasing();

    let Some(draft) = purchasing
        .draft_from_suggestions(SEED_SUPPLIER, &suggestions, SEED_USER)
        .await?
    else {
        return Ok(0);
    };
    purchasing.mark_ordered(draft.order.id).await?;

    Ok(draft.lines.len())
}

/// Log filter from `RUST_LOG`, with a readable default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,apoticare=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
