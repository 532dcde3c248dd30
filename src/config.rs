use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::services::pricing::PricingConfig;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO 4217 currency code used for all monetary amounts
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    /// Default tax rate (as decimal fraction, e.g. 0.08 for 8%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Orders with a subtotal at or above this amount ship for free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(custom = "validate_non_negative_amount")]
    pub free_shipping_threshold: f64,

    /// Flat shipping fee charged below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    #[validate(custom = "validate_non_negative_amount")]
    pub flat_shipping_fee: f64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_tax_rate() -> f64 {
    0.08
}

fn default_free_shipping_threshold() -> f64 {
    50.0
}

fn default_flat_shipping_fee() -> f64 {
    10.0
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount < 0.0 {
        let mut err = ValidationError::new("amount");
        err.message = Some("amount must be a finite non-negative value".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl AppConfig {
    /// Builds a minimal configuration, mainly for tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            default_tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_fee: default_flat_shipping_fee(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Pricing settings used by the cart aggregator and order assembler.
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            currency: self.currency.clone(),
            tax_rate: Decimal::from_f64(self.default_tax_rate).unwrap_or(Decimal::ZERO),
            free_shipping_threshold: Decimal::from_f64(self.free_shipping_threshold)
                .unwrap_or(Decimal::ZERO),
            flat_shipping_fee: Decimal::from_f64(self.flat_shipping_fee)
                .unwrap_or(Decimal::ZERO),
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config file (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", run_env.clone())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = test_config();
        cfg.validate().expect("default configuration should validate");
        assert_eq!(cfg.currency, "USD");
        assert_eq!(cfg.default_tax_rate, 0.08);
    }

    #[test]
    fn pricing_config_converts_to_decimal() {
        let pricing = test_config().pricing();
        assert_eq!(pricing.tax_rate, dec!(0.08));
        assert_eq!(pricing.free_shipping_threshold, dec!(50));
        assert_eq!(pricing.flat_shipping_fee, dec!(10));
    }

    #[test]
    fn rejects_out_of_range_tax_rate() {
        let mut cfg = test_config();
        cfg.default_tax_rate = 1.5;
        assert!(cfg.validate().is_err());

        cfg.default_tax_rate = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_shipping_settings() {
        let mut cfg = test_config();
        cfg.free_shipping_threshold = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.flat_shipping_fee = -5.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_event_channel_capacity() {
        let mut cfg = test_config();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn development_environment_allows_permissive_cors() {
        let mut cfg = test_config();
        cfg.environment = "development".to_string();
        assert!(cfg.should_allow_permissive_cors());

        cfg.environment = "production".to_string();
        assert!(!cfg.should_allow_permissive_cors());

        cfg.cors_allow_any_origin = true;
        assert!(cfg.should_allow_permissive_cors());
    }
}
