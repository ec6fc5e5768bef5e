//! # Forecast Arithmetic
//!
//! Depletion and reorder math for the replenishment forecaster.
//!
//! ## Formulas
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  daily      = units sold in trailing window / window days              │
//! │  monthly    = daily × 30                                               │
//! │  days left  = vendable / daily          (∞ when daily == 0)            │
//! │  depletion  = today + ⌊days left⌋       (none when ∞)                  │
//! │  reorder at = daily × (lead time + safety margin)                      │
//! │  suggested  = max(0, round(target days × daily − vendable))            │
//! │                                                                         │
//! │  Example: vendable 30, daily 3, target 30                              │
//! │    days left = 10, suggested = 90 − 30 = 60                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Urgency
//! `RUPTURE` when nothing is vendable, then `CRITIQUE` / `URGENT` by inclusive
//! day thresholds, `ATTENTION` otherwise (including infinite days left).

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Medication, UrgencyLevel};

/// Spacing of the projected stock series, in days.
pub const PROJECTION_STEP_DAYS: i64 = 5;

/// Length of the projected stock series, in days.
pub const PROJECTION_HORIZON_DAYS: i64 = 60;

// =============================================================================
// Settings
// =============================================================================

/// Forecast tuning, normally loaded from the `[forecast]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub analysis_window_days: i64,
    pub target_stock_days: i64,
    pub critical_days: i64,
    pub urgent_days: i64,
    pub lead_time_days: i64,
    pub safety_margin_days: i64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        ForecastSettings {
            analysis_window_days: 90,
            target_stock_days: 30,
            critical_days: 7,
            urgent_days: 14,
            lead_time_days: 3,
            safety_margin_days: 7,
        }
    }
}

// =============================================================================
// Prediction
// =============================================================================

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Prediction {
    pub medication_id: i64,
    pub medication_name: String,
    pub vendable_stock: i64,
    pub reorder_threshold: i64,
    pub daily_consumption: f64,
    pub monthly_consumption: f64,

    /// `None` means infinite (no consumption in the window).
    pub days_remaining: Option<f64>,

    #[ts(as = "Option<String>")]
    pub depletion_date: Option<NaiveDate>,

    pub reorder_point: i64,
    pub suggested_reorder_quantity: i64,
    pub urgency: UrgencyLevel,
}

impl Prediction {
    /// Stock is at or below the point where an order must leave.
    pub fn needs_reorder(&self) -> bool {
        self.daily_consumption > 0.0 && self.vendable_stock <= self.reorder_point
    }
}

/// One point of the projected stock curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockProjectionPoint {
    pub day_offset: i64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub projected_stock: i64,
}

// =============================================================================
// Formulas
// =============================================================================

/// Average units per day over the window. Zero when the window is empty.
pub fn daily_consumption(units_sold: i64, window_days: i64) -> f64 {
    if window_days <= 0 || units_sold <= 0 {
        return 0.0;
    }
    units_sold as f64 / window_days as f64
}

/// Days until vendable stock runs out; `None` when nothing is consumed.
pub fn days_remaining(vendable: i64, daily: f64) -> Option<f64> {
    if daily > 0.0 {
        Some(vendable.max(0) as f64 / daily)
    } else {
        None
    }
}

/// `max(0, round(target_days × daily − vendable))`.
pub fn suggested_reorder_quantity(vendable: i64, daily: f64, target_days: i64) -> i64 {
    let needed = target_days as f64 * daily - vendable as f64;
    needed.round().max(0.0) as i64
}

/// Stock level at which an order must be placed to arrive with a margin left.
pub fn reorder_point(daily: f64, settings: &ForecastSettings) -> i64 {
    (daily * (settings.lead_time_days + settings.safety_margin_days) as f64).ceil() as i64
}

/// Projected stock-out day. `None` when infinite or beyond the calendar.
pub fn depletion_date(today: NaiveDate, days: Option<f64>) -> Option<NaiveDate> {
    let days = days?;
    if !days.is_finite() || days < 0.0 || days > u32::MAX as f64 {
        return None;
    }
    today.checked_add_days(Days::new(days.floor() as u64))
}

pub fn classify(vendable: i64, days: Option<f64>, settings: &ForecastSettings) -> UrgencyLevel {
    if vendable <= 0 {
        return UrgencyLevel::Rupture;
    }
    match days {
        Some(days) => UrgencyLevel::from_days(days, settings.critical_days, settings.urgent_days),
        None => UrgencyLevel::Attention,
    }
}

/// Builds the prediction for one medication.
///
/// `units_sold` covers the trailing `window_days` ending today.
pub fn predict(
    medication: &Medication,
    vendable: i64,
    units_sold: i64,
    window_days: i64,
    today: NaiveDate,
    settings: &ForecastSettings,
) -> Prediction {
    let daily = daily_consumption(units_sold, window_days);
    let days = days_remaining(vendable, daily);

    Prediction {
        medication_id: medication.id,
        medication_name: medication.commercial_name.clone(),
        vendable_stock: vendable,
        reorder_threshold: medication.reorder_threshold,
        daily_consumption: daily,
        monthly_consumption: daily * 30.0,
        days_remaining: days,
        depletion_date: depletion_date(today, days),
        reorder_point: reorder_point(daily, settings),
        suggested_reorder_quantity: suggested_reorder_quantity(
            vendable,
            daily,
            settings.target_stock_days,
        ),
        urgency: classify(vendable, days, settings),
    }
}

/// Stock every [`PROJECTION_STEP_DAYS`] over [`PROJECTION_HORIZON_DAYS`],
/// never below zero.
pub fn project_stock(prediction: &Prediction, today: NaiveDate) -> Vec<StockProjectionPoint> {
    (0..=PROJECTION_HORIZON_DAYS)
        .step_by(PROJECTION_STEP_DAYS as usize)
        .filter_map(|offset| {
            let date = today.checked_add_days(Days::new(offset as u64))?;
            let consumed = (prediction.daily_consumption * offset as f64).round() as i64;
            Some(StockProjectionPoint {
                day_offset: offset,
                date,
                projected_stock: (prediction.vendable_stock - consumed).max(0),
            })
        })
        .collect()
}

/// Most urgent first, then fewest days remaining (infinite last).
pub fn sort_predictions(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| {
        b.urgency.cmp(&a.urgency).then_with(|| {
            let da = a.days_remaining.unwrap_or(f64::INFINITY);
            let db = b.days_remaining.unwrap_or(f64::INFINITY);
            da.total_cmp(&db)
        })
    });
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn medication(id: i64) -> Medication {
        Medication {
            id,
            commercial_name: format!("Med {}", id),
            active_ingredient: "X".to_string(),
            reorder_threshold: 10,
            unit_price_cents: 100,
            prescription_required: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[test]
    fn test_reference_forecast() {
        // 270 units over 90 days = 3/day
        let settings = ForecastSettings::default();
        let p = predict(&medication(1), 30, 270, 90, today(), &settings);

        assert_eq!(p.daily_consumption, 3.0);
        assert_eq!(p.monthly_consumption, 90.0);
        assert_eq!(p.days_remaining, Some(10.0));
        assert_eq!(p.suggested_reorder_quantity, 60);
        assert_eq!(p.depletion_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(p.reorder_point, 30);
        assert_eq!(p.urgency, UrgencyLevel::Urgent);
        assert!(p.needs_reorder());
    }

    #[test]
    fn test_no_consumption_is_infinite() {
        let p = predict(&medication(1), 12, 0, 90, today(), &ForecastSettings::default());
        assert_eq!(p.daily_consumption, 0.0);
        assert_eq!(p.days_remaining, None);
        assert_eq!(p.depletion_date, None);
        assert_eq!(p.suggested_reorder_quantity, 0);
        assert_eq!(p.urgency, UrgencyLevel::Attention);
    }

    #[test]
    fn test_rupture_when_nothing_vendable() {
        let p = predict(&medication(1), 0, 0, 90, today(), &ForecastSettings::default());
        assert_eq!(p.urgency, UrgencyLevel::Rupture);
    }

    #[test]
    fn test_days_remaining_strictly_decreases_with_consumption() {
        let mut previous = f64::INFINITY;
        for daily in [0.5, 1.0, 2.5, 4.0, 10.0] {
            let days = days_remaining(40, daily).unwrap();
            assert!(days < previous);
            previous = days;
        }
    }

    #[test]
    fn test_reorder_never_negative() {
        assert_eq!(suggested_reorder_quantity(500, 1.0, 30), 0);
        assert_eq!(suggested_reorder_quantity(0, 0.25, 30), 8);
    }

    #[test]
    fn test_projection_clamped_at_zero() {
        let p = predict(&medication(1), 30, 270, 90, today(), &ForecastSettings::default());
        let points = project_stock(&p, today());

        assert_eq!(points.len(), 13);
        assert_eq!(points[0].projected_stock, 30);
        assert_eq!(points[1].projected_stock, 15);
        assert_eq!(points[2].projected_stock, 0);
        assert!(points.iter().all(|pt| pt.projected_stock >= 0));
    }

    #[test]
    fn test_sort_most_urgent_first() {
        let settings = ForecastSettings::default();
        let mut list = vec![
            predict(&medication(1), 100, 90, 90, today(), &settings), // 100 days
            predict(&medication(2), 0, 10, 90, today(), &settings),   // rupture
            predict(&medication(3), 5, 90, 90, today(), &settings),   // 5 days
            predict(&medication(4), 60, 90, 90, today(), &settings),  // 60 days
        ];
        sort_predictions(&mut list);
        let ids: Vec<i64> = list.iter().map(|p| p.medication_id).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }
}
