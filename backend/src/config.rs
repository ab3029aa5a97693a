//! Configuration management for the inventory service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with INV__ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Inventory engine tuning
    pub inventory: InventorySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Server-side `statement_timeout` applied to every connection
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret used to verify bearer tokens issued by the auth service
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventorySettings {
    /// Upper bound for one engine operation, including its transaction
    pub storage_timeout_ms: u64,

    /// Rows committed per transaction during bulk import
    pub import_chunk_size: usize,

    /// Default dashboard page size
    pub dashboard_page_size: u32,
}

impl InventorySettings {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            storage_timeout_ms: 5_000,
            import_chunk_size: 50,
            dashboard_page_size: 20,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("INV_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 5000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 10)?
            .set_default("database.statement_timeout_ms", 5_000)?
            .set_default("inventory.storage_timeout_ms", 5_000)?
            .set_default("inventory.import_chunk_size", 50)?
            .set_default("inventory.dashboard_page_size", 20)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (INV__ prefix)
            .add_source(
                Environment::with_prefix("INV")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        if config.inventory.import_chunk_size == 0 {
            return Err(ConfigError::Message(
                "inventory.import_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
        }
    }
}
