use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "ENRICHD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/enrichd.toml";
const ENV_PREFIX: &str = "ENRICHD";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    // Load secrets from environment variables
    load_secrets(&mut config);

    Ok(config)
}

/// Load secrets from environment variables into config
/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(api_key) = env::var("ENRICHMENT_API_KEY") {
        config.enrichment.api_key = Some(api_key);
    }

    // Provider-specific fallbacks, matched to the configured model family
    if config.enrichment.api_key.is_none() {
        let fallback = if config.enrichment.model.starts_with("gemini") {
            "GEMINI_API_KEY"
        } else {
            "OPENAI_API_KEY"
        };
        if let Ok(api_key) = env::var(fallback) {
            config.enrichment.api_key = Some(api_key);
        }
    }

    // Optional: enables the search-assisted logo discovery path
    if let Ok(search_key) = env::var("SEARCH_API_KEY") {
        config.scraper.search_api_key = Some(search_key);
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // Add environment variable overrides
    // ENRICHD__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
