//! External collaborator interfaces
//!
//! Each capability the pipeline depends on is expressed as a minimal
//! trait; concrete implementations live in the submodules and are selected
//! once at startup. The processor only ever holds the trait objects, so
//! tests substitute in-memory fakes.

pub mod llm;
pub mod logo;
pub mod scraper;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EnrichmentData, QualityScore};

pub use llm::select_enricher;
pub use logo::{HttpLogoDiscoverer, SvgCliTransformer};
pub use scraper::HttpScraper;

/// Enrichment provider errors. `Transient` failures are retryable at the
/// delivery layer; `BadInput` is a per-job logical failure.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("upstream unavailable: {0}")]
    Transient(String),

    #[error("bad input: {0}")]
    BadInput(String),
}

/// Errors from the scraping and logo collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("tool invocation failed: {0}")]
    Tool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata scraped from a company website.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub source_url: String,
}

/// One financial report discovered on a company website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReport {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub year: Option<i32>,
}

/// A logo image located by the discoverer, downloaded and ready for the
/// transformer.
#[derive(Debug, Clone)]
pub struct DiscoveredLogo {
    pub source_url: String,
    pub content: Bytes,
    pub is_vector: bool,
}

/// Structured result of one logo-tool invocation. The tool may fail
/// partially (e.g. rasterization succeeds but icon extraction does not);
/// `output_files` lists whatever it produced.
#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    pub success: bool,
    pub output_files: Vec<PathBuf>,
    pub has_icon: bool,
    pub error: Option<String>,
}

/// Everything the enrichment provider gets to work with for one job.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentRequest<'a> {
    pub stock_code: &'a str,
    pub company_name: &'a str,
    pub industry: Option<&'a str>,
    pub website: Option<&'a str>,
    pub current_summary: Option<&'a str>,
    pub reports: &'a [FinancialReport],
    pub scraped_metadata: Option<&'a ScrapedMetadata>,
}

/// LLM-backed company enrichment.
#[async_trait]
pub trait CompanyEnricher: Send + Sync {
    /// Short provider tag used in error messages and logs ("gpt", "gemini").
    fn provider(&self) -> &str;

    /// Produce the enrichment data bundle for one company.
    async fn enrich_company(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError>;

    /// Score the produced bundle. Best-effort: callers degrade to an empty
    /// score when this fails.
    async fn evaluate_quality(
        &self,
        stock_code: &str,
        data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError>;
}

#[async_trait]
pub trait MetadataScraper: Send + Sync {
    async fn scrape_metadata(
        &self,
        website: &str,
        company_name: &str,
    ) -> Result<ScrapedMetadata, ClientError>;
}

#[async_trait]
pub trait ReportCrawler: Send + Sync {
    async fn crawl_financial_reports(
        &self,
        website: &str,
    ) -> Result<Vec<FinancialReport>, ClientError>;
}

#[async_trait]
pub trait LogoDiscoverer: Send + Sync {
    /// Locate and download a usable logo, or `None` when the site has
    /// nothing recognisable.
    async fn discover_logo(
        &self,
        website: &str,
        company_name: &str,
        stock_code: &str,
    ) -> Result<Option<DiscoveredLogo>, ClientError>;
}

/// The external logo tool: takes one image (raster or vector), produces
/// web-ready variants in `output_dir`. For vector input the tool attempts
/// a direct-XML text-removal pass first and falls back to rasterization;
/// that behaviour is the tool's own, callers only see the structured
/// result.
#[async_trait]
pub trait LogoTransformer: Send + Sync {
    async fn transform(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<TransformResult, ClientError>;
}
