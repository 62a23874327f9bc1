//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Symmetric key for card number / CVV encryption, 64 hex chars (32 bytes).
    /// Injected here rather than baked in so the key can be rotated per process.
    pub card_encryption_key: String,

    /// Hours between expiration sweep runs
    pub sweep_interval_hours: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let card_encryption_key = env::var("CARD_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEnv("CARD_ENCRYPTION_KEY"))?;

        // A malformed key must fail startup, not the first card read
        if card_encryption_key.len() != 64 || hex::decode(&card_encryption_key).is_err() {
            return Err(ConfigError::InvalidValue("CARD_ENCRYPTION_KEY"));
        }

        let sweep_interval_hours = env::var("SWEEP_INTERVAL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SWEEP_INTERVAL_HOURS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            card_encryption_key,
            sweep_interval_hours,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
