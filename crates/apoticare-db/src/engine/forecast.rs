//! # Replenishment Forecaster
//!
//! Depletion dates and reorder quantities from recent consumption. Read-only.
//!
//! ```text
//! for each active medication
//!     units sold in the last N days ─┐
//!     vendable stock ────────────────┼──► predict() ──► Prediction
//!     forecast settings ─────────────┘
//!
//! a medication whose figures cannot be read is logged and skipped
//! ```

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::engine::cache::StockReadScope;
use crate::engine::LedgerResult;
use apoticare_core::forecast::{
    predict, project_stock, sort_predictions, ForecastSettings, Prediction, StockProjectionPoint,
};
use apoticare_core::validation::validate_days;
use apoticare_core::{CoreError, Medication, ValidationError};

#[derive(Debug, Clone)]
pub struct ReplenishmentForecaster {
    scope: StockReadScope,
    settings: ForecastSettings,
}

impl ReplenishmentForecaster {
    pub fn new(scope: StockReadScope, settings: ForecastSettings) -> Self {
        ReplenishmentForecaster { scope, settings }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    /// Predictions for every active medication, most urgent first.
    ///
    /// `window_days` is the trailing consumption window.
    pub async fn generate_predictions(&self, window_days: i64) -> LedgerResult<Vec<Prediction>> {
        let since = self.window_start(window_days)?;

        let medications = self.scope.active_medications().await?;
        let mut predictions = Vec::with_capacity(medications.len());
        let mut skipped = 0usize;

        for medication in &medications {
            match self.predict_medication(medication, window_days, since).await {
                Ok(prediction) => predictions.push(prediction),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        medication_id = medication.id,
                        error = %e,
                        "Skipping medication in forecast"
                    );
                }
            }
        }

        sort_predictions(&mut predictions);

        info!(
            window_days,
            predicted = predictions.len(),
            skipped,
            "Predictions generated"
        );
        Ok(predictions)
    }

    /// Predictions over the configured analysis window.
    pub async fn generate_default_predictions(&self) -> LedgerResult<Vec<Prediction>> {
        self.generate_predictions(self.settings.analysis_window_days).await
    }

    /// Prediction for one medication, active or not.
    pub async fn predict_for(&self, medication_id: i64, window_days: i64) -> LedgerResult<Prediction> {
        let since = self.window_start(window_days)?;

        let medication = self
            .scope
            .medication(medication_id)
            .await?
            .ok_or(CoreError::MedicationNotFound(medication_id))?;

        self.predict_medication(&medication, window_days, since).await
    }

    /// Projected stock curve for one medication over the configured window.
    pub async fn projection(&self, medication_id: i64) -> LedgerResult<Vec<StockProjectionPoint>> {
        let prediction = self
            .predict_for(medication_id, self.settings.analysis_window_days)
            .await?;
        Ok(project_stock(&prediction, self.scope.today()))
    }

    /// Medications at or below their reorder point, most urgent first.
    pub async fn reorder_suggestions(&self) -> LedgerResult<Vec<Prediction>> {
        let predictions = self.generate_default_predictions().await?;
        Ok(predictions
            .into_iter()
            .filter(|p| p.needs_reorder() || p.vendable_stock == 0)
            .collect())
    }

    /// Start of the trailing consumption window.
    fn window_start(&self, window_days: i64) -> LedgerResult<DateTime<Utc>> {
        validate_days("window_days", window_days)?;

        Duration::try_days(window_days)
            .and_then(|window| self.scope.now().checked_sub_signed(window))
            .ok_or_else(|| {
                ValidationError::Invalid {
                    field: "window_days".to_string(),
                    reason: "reaches past the calendar".to_string(),
                }
                .into()
            })
    }

    async fn predict_medication(
        &self,
        medication: &Medication,
        window_days: i64,
        since: DateTime<Utc>,
    ) -> LedgerResult<Prediction> {
        let units_sold = self.scope.units_sold_since(medication.id, since).await?;
        let vendable = self.scope.vendable_stock(medication.id).await?;

        let prediction = predict(
            medication,
            vendable,
            units_sold,
            window_days,
            self.scope.today(),
            &self.settings,
        );

        debug!(
            medication_id = medication.id,
            vendable,
            units_sold,
            urgency = %prediction.urgency,
            "Medication forecast"
        );
        Ok(prediction)
    }
}
