//! # Ops Configuration
//!
//! Configuration for the fulfillment services: where the database lives,
//! how to reach the carrier and the payment processor, which reason codes
//! inventory adjustments accept, and how logs are written.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DATABASE_PATH=/var/lib/tally/tally.db                        │
//! │     TALLY_CARRIER_URL=https://labels.example.com/v1                    │
//! │     TALLY_PAYMENTS_API_KEY=sk_live_...                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-ops/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.ops/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     local database file, localhost services, built-in reason codes     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "./tally.db"
//! max_connections = 5
//!
//! [carrier]
//! base_url = "https://labels.example.com/v1"
//! api_key = "ck_..."
//!
//! [payments]
//! base_url = "https://payments.example.com/v1"
//! api_key = "sk_..."
//! currency = "usd"
//!
//! [inventory]
//! reason_codes = ["cycle_count", "damaged_in_warehouse", "lost"]
//!
//! [logging]
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use tally_core::{DEFAULT_CURRENCY, DEFAULT_REASON_CODES};
use tally_db::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the config file.
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written back as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A service URL does not parse.
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// A value is out of its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file. The file is created if missing.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./tally.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration for [`tally_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path).max_connections(self.max_connections)
    }
}

// =============================================================================
// External Services
// =============================================================================

/// Carrier label service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierSettings {
    /// Base URL; `/labels` is appended per request.
    #[serde(default = "default_carrier_url")]
    pub base_url: String,

    /// Bearer token sent on every request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Whole-request timeout. Label purchase is never retried.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_carrier_url() -> String {
    "http://localhost:8081".to_string()
}

impl Default for CarrierSettings {
    fn default() -> Self {
        CarrierSettings {
            base_url: default_carrier_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Payment processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// Base URL; `/refunds` is appended per request.
    #[serde(default = "default_payments_url")]
    pub base_url: String,

    /// Bearer token sent on every request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// ISO currency code of refund amounts (minor units).
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_payments_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for PaymentSettings {
    fn default() -> Self {
        PaymentSettings {
            base_url: default_payments_url(),
            api_key: None,
            currency: default_currency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// =============================================================================
// Inventory & Logging
// =============================================================================

/// Inventory adjustment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Reason codes an adjustment may carry.
    #[serde(default = "default_reason_codes")]
    pub reason_codes: Vec<String>,
}

fn default_reason_codes() -> Vec<String> {
    DEFAULT_REASON_CODES.iter().map(|c| c.to_string()).collect()
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            reason_codes: default_reason_codes(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Filter directives used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub carrier: CarrierSettings,

    #[serde(default)]
    pub payments: PaymentSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl OpsConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ops config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
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
            warn!("Failed to load ops config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Ops config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        check_url("carrier.base_url", &self.carrier.base_url)?;
        check_url("payments.base_url", &self.payments.base_url)?;

        if self.carrier.timeout_secs == 0 || self.payments.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "carrier.timeout_secs and payments.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        let currency = self.payments.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(format!(
                "payments.currency must be a 3-letter ISO code, got: '{}'",
                self.payments.currency
            )));
        }

        if self.inventory.reason_codes.is_empty()
            || self.inventory.reason_codes.iter().any(|c| c.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "inventory.reason_codes must list at least one non-empty code".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("TALLY_CARRIER_URL") {
            debug!(url = %url, "Overriding carrier URL from environment");
            self.carrier.base_url = url;
        }

        if let Ok(key) = std::env::var("TALLY_CARRIER_API_KEY") {
            self.carrier.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("TALLY_PAYMENTS_URL") {
            debug!(url = %url, "Overriding payments URL from environment");
            self.payments.base_url = url;
        }

        if let Ok(key) = std::env::var("TALLY_PAYMENTS_API_KEY") {
            self.payments.api_key = Some(key);
        }

        if let Ok(currency) = std::env::var("TALLY_CURRENCY") {
            self.payments.currency = currency.to_lowercase();
        }

        if let Ok(json) = std::env::var("TALLY_LOG_JSON") {
            match json.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json = true,
                "0" | "false" | "no" => self.logging.json = false,
                _ => warn!(value = %json, "Unknown TALLY_LOG_JSON value in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "ops")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }
}

fn check_url(field: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: format!("expected http or https, got {}", parsed.scheme()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payments.currency, "usd");
        assert_eq!(config.inventory.reason_codes.len(), DEFAULT_REASON_CODES.len());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = OpsConfig::from_toml(
            r#"
            [carrier]
            base_url = "https://labels.example.com/v1"

            [inventory]
            reason_codes = ["cycle_count"]
            "#,
        )
        .unwrap();

        assert_eq!(config.carrier.base_url, "https://labels.example.com/v1");
        assert_eq!(config.inventory.reason_codes, vec!["cycle_count".to_string()]);
        assert_eq!(config.payments.base_url, default_payments_url());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = OpsConfig::default();

        config.carrier.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.carrier.base_url = "ftp://labels.example.com".to_string();
        assert!(config.validate().is_err());

        config.carrier.base_url = default_carrier_url();
        config.inventory.reason_codes.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.inventory.reason_codes = default_reason_codes();
        config.payments.currency = "dollars".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            OpsConfig::from_toml("[database\npath = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_serialization() {
        let config = OpsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[payments]"));
        assert!(toml_str.contains("[inventory]"));
    }

    #[test]
    fn test_database_settings_build_db_config() {
        let settings = DatabaseSettings {
            path: PathBuf::from("/tmp/tally-test.db"),
            max_connections: 3,
        };
        let db_config = settings.db_config();
        assert_eq!(db_config.max_connections, 3);
        assert_eq!(db_config.database_path, Some(PathBuf::from("/tmp/tally-test.db")));
    }
}
