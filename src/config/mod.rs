//! Configuration management for enrichd
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use enrichd::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `ENRICHD__<section>__<key>`
//!
//! Examples:
//! - `ENRICHD__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `ENRICHD__QUEUE__ENABLED=true`
//! - `ENRICHD__PROCESSING__JOB_TIMEOUT=15m`
//!
//! Secrets are environment-only: `ENRICHMENT_API_KEY` (or the
//! provider-specific `OPENAI_API_KEY` / `GEMINI_API_KEY`) and the optional
//! `SEARCH_API_KEY`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/enrichd.toml`.
//! This can be overridden using the `ENRICHD_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{
    Config, EnrichmentConfig, LedgerConfig, LogoConfig, LogoStorageProvider, ProcessingConfig,
    QueueConfig, ScraperConfig, ServerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`ENRICHD__*`)
    /// 2. TOML file (default: `config/enrichd.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails
    /// (unsupported model, missing API key, out-of-range thresholds).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files. Skips secret
    /// loading, so tests set `api_key` directly.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let mut config = sources::load_from_sources(path)?;
        if config.enrichment.api_key.is_none() {
            if let Ok(key) = std::env::var("ENRICHMENT_API_KEY") {
                config.enrichment.api_key = Some(key);
            }
        }
        validation::validate(&config)?;
        Ok(config)
    }
}
