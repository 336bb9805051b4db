use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub logo: LogoConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// HTTP server configuration (push receiver + admin endpoints)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Ledger (embedded job/artifact store) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Pull-subscription queue configuration. When disabled the worker falls
/// back to polling the ledger for queued jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    #[serde(default = "default_receive_interval")]
    pub receive_interval: HumanDuration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_queue_path(),
            workers: default_workers(),
            channel_size: default_channel_size(),
            receive_interval: default_receive_interval(),
        }
    }
}

/// LLM provider configuration. The model name selects the provider:
/// "gpt-*" for any OpenAI-compatible endpoint, "gemini-*" for Gemini.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the selected provider (loaded from environment, not
    /// from the config file)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Website scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_scrape_timeout")]
    pub request_timeout: HumanDuration,
    pub user_agent: Option<String>,
    /// Web-search API key enabling the auxiliary logo discovery path
    /// (loaded from environment, not from the config file). Absence just
    /// disables that path.
    #[serde(skip)]
    pub search_api_key: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_scrape_timeout(),
            user_agent: None,
            search_api_key: None,
        }
    }
}

/// Storage provider for transformed logos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoStorageProvider {
    Gcs,
    Memory,
}

impl Default for LogoStorageProvider {
    fn default() -> Self {
        LogoStorageProvider::Memory
    }
}

/// Logo pipeline configuration. An empty/absent bucket disables the whole
/// logo phase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogoConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub provider: LogoStorageProvider,
    #[serde(default = "default_transformer_bin")]
    pub transformer_bin: PathBuf,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            provider: LogoStorageProvider::default(),
            transformer_bin: default_transformer_bin(),
        }
    }
}

impl LogoConfig {
    /// The configured bucket, with "" treated as unset.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }
}

/// Job processing knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_job_timeout")]
    pub job_timeout: HumanDuration,
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: HumanDuration,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: HumanDuration,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: HumanDuration,
    #[serde(default = "default_keep_completed")]
    pub keep_completed_per_stock: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            job_timeout: default_job_timeout(),
            stuck_threshold: default_stuck_threshold(),
            quality_threshold: default_quality_threshold(),
            poll_interval: default_poll_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            cleanup_interval: default_cleanup_interval(),
            keep_completed_per_stock: default_keep_completed(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

fn default_workers() -> usize {
    4
}

fn default_channel_size() -> usize {
    16
}

fn default_receive_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_scrape_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_transformer_bin() -> PathBuf {
    PathBuf::from("logo-tool")
}

fn default_job_timeout() -> HumanDuration {
    HumanDuration::from_secs(10 * 60)
}

fn default_stuck_threshold() -> HumanDuration {
    HumanDuration::from_secs(5 * 60)
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_heartbeat_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_cleanup_interval() -> HumanDuration {
    HumanDuration::from_secs(2 * 60)
}

fn default_keep_completed() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ledger: LedgerConfig::default(),
            queue: QueueConfig::default(),
            enrichment: EnrichmentConfig::default(),
            scraper: ScraperConfig::default(),
            logo: LogoConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}
