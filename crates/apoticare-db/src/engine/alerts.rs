//! # Alert Evaluator
//!
//! Low stock, lots nearing expiration, and expired lots still on the shelf.
//! Evaluated on demand; nothing here is triggered by a sale.

use chrono::Days;
use tracing::debug;

use crate::engine::cache::StockReadScope;
use crate::engine::LedgerResult;
use apoticare_core::alerts::{
    expiration_alert, expired_lot, low_stock_alert, AlertSettings, ExpirationAlert, ExpiredLot,
    LowStockAlert,
};
use apoticare_core::validation::validate_days;
use apoticare_core::ValidationError;

#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    scope: StockReadScope,
    settings: AlertSettings,
}

impl AlertEvaluator {
    pub fn new(scope: StockReadScope, settings: AlertSettings) -> Self {
        AlertEvaluator { scope, settings }
    }

    /// Active medications whose vendable stock is below their threshold.
    ///
    /// Most severe first, then largest deficit.
    pub async fn low_stock_alerts(&self) -> LedgerResult<Vec<LowStockAlert>> {
        let medications = self.scope.active_medications().await?;

        let mut alerts = Vec::new();
        for medication in &medications {
            let vendable = self.scope.vendable_stock(medication.id).await?;
            if let Some(alert) = low_stock_alert(medication, vendable) {
                alerts.push(alert);
            }
        }

        alerts.sort_by(|a, b| {
            b.urgency
                .cmp(&a.urgency)
                .then_with(|| b.deficit.cmp(&a.deficit))
                .then_with(|| a.medication_name.cmp(&b.medication_name))
        });

        debug!(count = alerts.len(), "Low stock alerts evaluated");
        Ok(alerts)
    }

    /// Unexpired lots with stock expiring within `window_days` (configured
    /// default when `None`), soonest first.
    pub async fn expiration_alerts(
        &self,
        window_days: Option<i64>,
    ) -> LedgerResult<Vec<ExpirationAlert>> {
        let window = window_days.unwrap_or(self.settings.expiration_window_days);
        validate_days("window_days", window)?;

        let today = self.scope.today();
        let until = today
            .checked_add_days(Days::new(window as u64))
            .ok_or_else(|| ValidationError::Invalid {
                field: "window_days".to_string(),
                reason: "reaches past the calendar".to_string(),
            })?;

        let listings = self.scope.lots().expiring_between(today, until).await?;
        let alerts: Vec<ExpirationAlert> = listings
            .iter()
            .filter_map(|l| expiration_alert(&l.lot, &l.medication_name, window, today, &self.settings))
            .collect();

        debug!(window, count = alerts.len(), "Expiration alerts evaluated");
        Ok(alerts)
    }

    /// Expired lots still holding stock, with their value at purchase price.
    pub async fn expired_lots(&self) -> LedgerResult<Vec<ExpiredLot>> {
        let today = self.scope.today();
        let listings = self.scope.lots().expired_with_stock(today).await?;

        Ok(listings
            .iter()
            .filter_map(|l| expired_lot(&l.lot, &l.medication_name, today))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{date, lot, medication, test_db};
    use apoticare_core::{ErrorKind, NewMedication, UrgencyLevel};

    #[tokio::test]
    async fn test_low_stock_levels() {
        let db = test_db().await;
        let out = medication(&db, "Ventoline", 10, 450).await;
        let low = medication(&db, "Gaviscon", 20, 520).await;
        lot(&db, low.id, "G1", date(2024, 8, 1), 8).await;
        let fine = medication(&db, "Dafalgan", 10, 210).await;
        lot(&db, fine.id, "D1", date(2024, 8, 1), 10).await;
        // expired units do not count as vendable
        let stale = medication(&db, "Humex", 10, 690).await;
        lot(&db, stale.id, "H1", date(2024, 1, 1), 40).await;
        lot(&db, stale.id, "H2", date(2024, 8, 1), 6).await;

        let alerts = db.alerts().low_stock_alerts().await.unwrap();
        let ids: Vec<i64> = alerts.iter().map(|a| a.medication_id).collect();
        assert_eq!(ids, vec![out.id, low.id, stale.id]);

        assert_eq!(alerts[0].urgency, UrgencyLevel::Rupture);
        assert_eq!(alerts[0].deficit, 10);
        assert_eq!(alerts[1].urgency, UrgencyLevel::Urgent);
        assert_eq!(alerts[1].deficit, 12);
        assert_eq!(alerts[2].urgency, UrgencyLevel::Attention);
        assert_eq!(alerts[2].vendable_stock, 6);
    }

    #[tokio::test]
    async fn test_zero_threshold_raises_nothing() {
        let db = test_db().await;
        let med = medication(&db, "Biafine", 0, 640).await;
        lot(&db, med.id, "B1", date(2024, 8, 1), 5).await;
        medication(&db, "Bepanthen", 0, 720).await;

        assert!(db.alerts().low_stock_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unset_threshold_takes_default_at_registration() {
        let db = test_db().await;
        let med = db
            .register_medication(&NewMedication {
                commercial_name: "Biafine".to_string(),
                active_ingredient: "Trolamine".to_string(),
                reorder_threshold: None,
                unit_price_cents: 640,
                prescription_required: false,
            })
            .await
            .unwrap();
        assert_eq!(med.reorder_threshold, 10);
        lot(&db, med.id, "B1", date(2024, 8, 1), 4).await;

        let alerts = db.alerts().low_stock_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].threshold, 10);
        assert_eq!(alerts[0].deficit, 6);
    }

    #[tokio::test]
    async fn test_expiration_tiers_and_order() {
        let db = test_db().await;
        let med = medication(&db, "Advil", 1, 390).await;
        let far = lot(&db, med.id, "FAR", date(2024, 3, 1), 5).await;
        let soon = lot(&db, med.id, "SOON", date(2024, 1, 10), 5).await;
        let mid = lot(&db, med.id, "MID", date(2024, 1, 15), 5).await;
        lot(&db, med.id, "GONE", date(2024, 1, 4), 5).await;
        lot(&db, med.id, "EMPTY", date(2024, 1, 8), 0).await;
        lot(&db, med.id, "LATE", date(2024, 12, 1), 5).await;

        let alerts = db.alerts().expiration_alerts(None).await.unwrap();
        let ids: Vec<i64> = alerts.iter().map(|a| a.lot_id).collect();
        assert_eq!(ids, vec![soon.id, mid.id, far.id]);

        assert_eq!((alerts[0].days_remaining, alerts[0].urgency), (5, UrgencyLevel::Critique));
        assert_eq!((alerts[1].days_remaining, alerts[1].urgency), (10, UrgencyLevel::Urgent));
        assert_eq!(alerts[2].urgency, UrgencyLevel::Attention);
        assert_eq!(alerts[0].medication_name, "Advil");

        let narrow = db.alerts().expiration_alerts(Some(7)).await.unwrap();
        assert_eq!(narrow.len(), 1);

        let err = db.alerts().expiration_alerts(Some(0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_expired_lots_with_value() {
        let db = test_db().await;
        let med = medication(&db, "Maalox", 5, 330).await;
        let gone = lot(&db, med.id, "M1", date(2023, 12, 20), 7).await;
        lot(&db, med.id, "M2", date(2023, 12, 1), 0).await;
        lot(&db, med.id, "M3", date(2024, 1, 5), 3).await;

        let expired = db.alerts().expired_lots().await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lot_id, gone.id);
        assert_eq!(expired[0].days_expired, 16);
        assert_eq!(expired[0].value.cents(), 700);
    }
}
