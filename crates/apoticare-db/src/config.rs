//! # Ledger Configuration
//!
//! Store location, alert tiers and forecast tuning.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     APOTICARE_DB_PATH=/srv/pharmacy/ledger.db                          │
//! │     APOTICARE_FORECAST_TARGET_DAYS=45                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger/ledger.toml (Linux)                               │
//! │     ~/Library/Application Support/com.apoticare.ledger/ledger.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/pharmacy/ledger.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [alerts]
//! expiration_window_days = 90
//! critical_days = 7
//! urgent_days = 14
//! default_low_stock_threshold = 10
//!
//! [forecast]
//! analysis_window_days = 90
//! target_stock_days = 30
//! critical_days = 7
//! urgent_days = 14
//! lead_time_days = 3
//! safety_margin_days = 7
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

use apoticare_core::alerts::AlertSettings;
use apoticare_core::forecast::ForecastSettings;

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `ledger.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the lock before failing with `Busy`.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub forecast: ForecastSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| DbError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Windows must be positive and critical thresholds must not exceed
    /// urgent ones, in both sections.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        let positive = [
            ("alerts.expiration_window_days", self.alerts.expiration_window_days),
            ("alerts.critical_days", self.alerts.critical_days),
            ("alerts.urgent_days", self.alerts.urgent_days),
            ("forecast.analysis_window_days", self.forecast.analysis_window_days),
            ("forecast.target_stock_days", self.forecast.target_stock_days),
            ("forecast.critical_days", self.forecast.critical_days),
            ("forecast.urgent_days", self.forecast.urgent_days),
        ];
        for (field, value) in positive {
            if value <= 0 {
                return Err(DbError::InvalidConfig(format!(
                    "{} must be greater than 0, got {}",
                    field, value
                )));
            }
        }

        let non_negative = [
            ("alerts.default_low_stock_threshold", self.alerts.default_low_stock_threshold),
            ("forecast.lead_time_days", self.forecast.lead_time_days),
            ("forecast.safety_margin_days", self.forecast.safety_margin_days),
        ];
        for (field, value) in non_negative {
            if value < 0 {
                return Err(DbError::InvalidConfig(format!(
                    "{} must not be negative, got {}",
                    field, value
                )));
            }
        }

        if self.alerts.critical_days > self.alerts.urgent_days {
            return Err(DbError::InvalidConfig(
                "alerts.critical_days must not exceed alerts.urgent_days".into(),
            ));
        }

        if self.forecast.critical_days > self.forecast.urgent_days {
            return Err(DbError::InvalidConfig(
                "forecast.critical_days must not exceed forecast.urgent_days".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("APOTICARE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        env_override("APOTICARE_DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        env_override("APOTICARE_DB_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);

        env_override(
            "APOTICARE_ALERTS_EXPIRATION_WINDOW_DAYS",
            &mut self.alerts.expiration_window_days,
        );
        env_override("APOTICARE_ALERTS_CRITICAL_DAYS", &mut self.alerts.critical_days);
        env_override("APOTICARE_ALERTS_URGENT_DAYS", &mut self.alerts.urgent_days);
        env_override(
            "APOTICARE_ALERTS_LOW_STOCK_THRESHOLD",
            &mut self.alerts.default_low_stock_threshold,
        );

        env_override(
            "APOTICARE_FORECAST_WINDOW_DAYS",
            &mut self.forecast.analysis_window_days,
        );
        env_override(
            "APOTICARE_FORECAST_TARGET_DAYS",
            &mut self.forecast.target_stock_days,
        );
        env_override("APOTICARE_FORECAST_CRITICAL_DAYS", &mut self.forecast.critical_days);
        env_override("APOTICARE_FORECAST_URGENT_DAYS", &mut self.forecast.urgent_days);
        env_override("APOTICARE_FORECAST_LEAD_TIME_DAYS", &mut self.forecast.lead_time_days);
        env_override(
            "APOTICARE_FORECAST_SAFETY_MARGIN_DAYS",
            &mut self.forecast.safety_margin_days,
        );
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "apoticare", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    /// Returns the default database file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "apoticare", "ledger")
            .map(|dirs| dirs.data_dir().join("ledger.db"))
    }

    /// Builds the pool configuration for this ledger.
    pub fn db_config(&self) -> DbResult<DbConfig> {
        let path = self
            .database
            .path
            .clone()
            .or_else(Self::default_database_path)
            .ok_or_else(|| DbError::InvalidConfig("No database path available".into()))?;

        Ok(DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .busy_timeout(std::time::Duration::from_millis(self.database.busy_timeout_ms)))
    }
}

/// Parses `var` into `target` when set; logs and keeps the old value otherwise.
fn env_override<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!(var, value = %raw, "Overriding config from environment");
                *target = value;
            }
            Err(_) => warn!(var, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.alerts.expiration_window_days, 90);
        assert_eq!(config.alerts.default_low_stock_threshold, 10);
        assert_eq!(config.forecast.target_stock_days, 30);
        assert_eq!(config.forecast.lead_time_days, 3);
        assert_eq!(config.forecast.safety_margin_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.forecast.critical_days = 20;
        assert!(config.validate().is_err());

        config.forecast.critical_days = 7;
        config.alerts.expiration_window_days = 0;
        assert!(config.validate().is_err());

        config.alerts.expiration_window_days = 30;
        config.forecast.lead_time_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [forecast]
            target_stock_days = 45
            "#,
        )
        .unwrap();

        assert_eq!(config.forecast.target_stock_days, 45);
        assert_eq!(config.forecast.analysis_window_days, 90);
        assert_eq!(config.alerts.urgent_days, 14);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("ledger-{}.toml", uuid::Uuid::new_v4()));

        let mut config = LedgerConfig::default();
        config.alerts.expiration_window_days = 60;
        config.save(Some(path.clone())).unwrap();

        let loaded = LedgerConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.alerts.expiration_window_days, 60);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_toml_sections() {
        let toml_str = toml::to_string_pretty(&LedgerConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[alerts]"));
        assert!(toml_str.contains("[forecast]"));
    }
}
