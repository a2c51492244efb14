//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Public key id for the Razorpay REST API (basic auth user).
    pub razorpay_key_id: String,
    /// Server-held secret: signs gateway payments and our payment receipts.
    pub razorpay_key_secret: String,
    pub razorpay_base_url: String,
    /// How long a payment receipt from /payments/verify stays valid.
    pub receipt_ttl: Duration,
    /// Explicit CORS allow-list.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Payment Gateway Settings ---
        let razorpay_key_id = std::env::var("RAZORPAY_KEY_ID")
            .map_err(|_| ConfigError::MissingVar("RAZORPAY_KEY_ID".to_string()))?;
        let razorpay_key_secret = std::env::var("RAZORPAY_KEY_SECRET")
            .map_err(|_| ConfigError::MissingVar("RAZORPAY_KEY_SECRET".to_string()))?;
        let razorpay_base_url = std::env::var("RAZORPAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        let receipt_ttl_secs = std::env::var("RECEIPT_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidValue("RECEIPT_TTL_SECS".to_string(), e.to_string())
            })?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_base_url,
            receipt_ttl: Duration::from_secs(receipt_ttl_secs),
            allowed_origins,
        })
    }
}
