//! The five-phase enrichment pipeline
//!
//! Phases run strictly in order for one job:
//!
//! 1. Scrape website metadata        (degradable)
//! 2. Crawl financial reports        (degradable)
//! 3. LLM enrichment                 (fatal)
//! 4. Logo discover/transform/upload (every sub-step degradable)
//! 5. Quality evaluation             (degradable)
//!
//! Phases 1 and 2 are independent but run sequentially; determinism is
//! worth more than the marginal latency. The caller wraps the whole run in
//! the job deadline.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::clients::{
    ClientError, CompanyEnricher, DiscoveredLogo, EnrichmentRequest, FinancialReport,
    LogoDiscoverer, LogoTransformer, MetadataScraper, ReportCrawler, ScrapedMetadata,
};
use crate::model::{EnrichmentData, EnrichmentJob, QualityScore, StockDetails};
use crate::observability::Metrics;
use crate::storage::StorageClient;

const CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{provider} enrichment failed: {message}")]
    Enrichment { provider: String, message: String },
}

/// What a successful pipeline run hands back for saving.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub data: EnrichmentData,
    pub quality: QualityScore,
}

/// The logo leg of the pipeline. Absent entirely when no bucket or
/// discoverer is configured, in which case phase 4 is skipped.
pub struct LogoPipeline {
    pub discoverer: Arc<dyn LogoDiscoverer>,
    pub transformer: Arc<dyn LogoTransformer>,
    pub storage: StorageClient,
}

/// Variants the logo tool can produce, keyed by its fixed output names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetKind {
    Png,
    Svg,
    IconPng,
    IconSvg,
}

impl AssetKind {
    fn from_path(path: &std::path::Path) -> Option<Self> {
        match path.file_name()?.to_str()? {
            "logo.png" => Some(AssetKind::Png),
            "logo.svg" => Some(AssetKind::Svg),
            "logo_icon.png" => Some(AssetKind::IconPng),
            "logo_icon.svg" => Some(AssetKind::IconSvg),
            _ => None,
        }
    }

    /// Deterministic object name so re-runs overwrite in place.
    fn object_name(&self, stock_code: &str) -> String {
        match self {
            AssetKind::Png => format!("logos/{}.png", stock_code),
            AssetKind::Svg => format!("logos/{}.svg", stock_code),
            AssetKind::IconPng => format!("logos/{}_icon.png", stock_code),
            AssetKind::IconSvg => format!("logos/{}_icon.svg", stock_code),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            AssetKind::Png | AssetKind::IconPng => "image/png",
            AssetKind::Svg | AssetKind::IconSvg => "image/svg+xml",
        }
    }
}

/// Uploaded asset URLs, collected during phase 4. The fallback selection
/// runs after all uploads, never during.
#[derive(Debug, Clone, Default)]
struct LogoUrls {
    png: Option<String>,
    svg: Option<String>,
    icon_png: Option<String>,
    icon_svg: Option<String>,
}

impl LogoUrls {
    fn set(&mut self, kind: AssetKind, url: String) {
        match kind {
            AssetKind::Png => self.png = Some(url),
            AssetKind::Svg => self.svg = Some(url),
            AssetKind::IconPng => self.icon_png = Some(url),
            AssetKind::IconSvg => self.icon_svg = Some(url),
        }
    }

    /// Main logo: raster preferred, vector stands in when missing.
    fn main_url(&self) -> Option<String> {
        self.png.clone().or_else(|| self.svg.clone())
    }

    /// Icon: iconPNG -> iconSVG -> fullSVG.
    fn icon_url(&self) -> Option<String> {
        self.icon_png
            .clone()
            .or_else(|| self.icon_svg.clone())
            .or_else(|| self.svg.clone())
    }
}

pub struct Pipeline {
    enricher: Arc<dyn CompanyEnricher>,
    scraper: Arc<dyn MetadataScraper>,
    crawler: Arc<dyn ReportCrawler>,
    logo: Option<LogoPipeline>,
    quality_threshold: f64,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        enricher: Arc<dyn CompanyEnricher>,
        scraper: Arc<dyn MetadataScraper>,
        crawler: Arc<dyn ReportCrawler>,
        logo: Option<LogoPipeline>,
        quality_threshold: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            enricher,
            scraper,
            crawler,
            logo,
            quality_threshold,
            metrics,
        }
    }

    /// Run all five phases for one job. The only fatal phase is the LLM
    /// enrichment; everything else degrades with a log line.
    pub async fn run(
        &self,
        job: &EnrichmentJob,
        stock: &StockDetails,
    ) -> Result<EnrichmentOutcome, PipelineError> {
        let job_id = job.job_id.as_str();
        let stock_code = stock.stock_code.as_str();

        // Phase 1: scrape metadata
        let metadata = self.scrape_metadata(job_id, stock).await;

        // Phase 2: crawl financial reports
        let reports = self.crawl_reports(job_id, stock).await;

        // Phase 3: LLM enrichment (fatal)
        let request = EnrichmentRequest {
            stock_code,
            company_name: &stock.company_name,
            industry: stock.industry.as_deref(),
            website: stock.website.as_deref(),
            current_summary: stock.summary.as_deref(),
            reports: &reports,
            scraped_metadata: metadata.as_ref(),
        };
        let mut data = self
            .enricher
            .enrich_company(&request)
            .await
            .map_err(|e| PipelineError::Enrichment {
                provider: self.enricher.provider().to_string(),
                message: e.to_string(),
            })?;
        debug!(job_id, stock_code, "Enrichment data produced");

        // Phase 4: logo discovery, transform, upload
        if let Some(logo) = &self.logo {
            logo.run(stock_code, stock, &mut data, &self.metrics).await;
        } else {
            debug!(job_id, "Logo pipeline not configured, skipping");
        }

        // Phase 5: quality evaluation
        let quality = self.evaluate_quality(job_id, stock_code, &data).await;

        Ok(EnrichmentOutcome { data, quality })
    }

    async fn scrape_metadata(
        &self,
        job_id: &str,
        stock: &StockDetails,
    ) -> Option<ScrapedMetadata> {
        let Some(website) = stock.website.as_deref() else {
            debug!(job_id, "No website on record, skipping metadata scrape");
            return None;
        };

        match self.scraper.scrape_metadata(website, &stock.company_name).await {
            Ok(metadata) => {
                debug!(job_id, website, "Metadata scraped");
                Some(metadata)
            }
            Err(e) => {
                warn!(job_id, website, error = %e, "Metadata scrape failed, continuing without");
                self.metrics.phase_degraded();
                None
            }
        }
    }

    async fn crawl_reports(&self, job_id: &str, stock: &StockDetails) -> Vec<FinancialReport> {
        let Some(website) = stock.website.as_deref() else {
            debug!(job_id, "No website on record, skipping report crawl");
            return Vec::new();
        };

        match self.crawler.crawl_financial_reports(website).await {
            Ok(reports) => {
                debug!(job_id, website, count = reports.len(), "Reports crawled");
                reports
            }
            Err(e) => {
                warn!(job_id, website, error = %e, "Report crawl failed, continuing without");
                self.metrics.phase_degraded();
                Vec::new()
            }
        }
    }

    async fn evaluate_quality(
        &self,
        job_id: &str,
        stock_code: &str,
        data: &EnrichmentData,
    ) -> QualityScore {
        let mut quality = match self.enricher.evaluate_quality(stock_code, data).await {
            Ok(score) => score,
            Err(e) => {
                warn!(job_id, stock_code, error = %e, "Quality evaluation failed");
                self.metrics.phase_degraded();
                QualityScore::degraded(format!("quality evaluation failed: {}", e))
            }
        };

        if quality.overall_score > 0.0 && quality.overall_score < self.quality_threshold {
            quality.warnings.push(format!(
                "overall_score {:.2} is below threshold {:.2}",
                quality.overall_score, self.quality_threshold
            ));
        }

        quality
    }
}

impl LogoPipeline {
    /// Phase 4 entry point. Never fails the job: everything in here is a
    /// sub-step that degrades to "no logo this run".
    async fn run(
        &self,
        stock_code: &str,
        stock: &StockDetails,
        data: &mut EnrichmentData,
        metrics: &Metrics,
    ) {
        let Some(website) = stock.website.as_deref() else {
            debug!(stock_code, "No website on record, skipping logo discovery");
            return;
        };

        let discovered = match self
            .discoverer
            .discover_logo(website, &stock.company_name, stock_code)
            .await
        {
            Ok(Some(logo)) => logo,
            Ok(None) => {
                debug!(stock_code, "No logo discovered, skipping rest of phase");
                return;
            }
            Err(e) => {
                warn!(stock_code, error = %e, "Logo discovery failed, skipping rest of phase");
                metrics.phase_degraded();
                return;
            }
        };

        if let Err(e) = self
            .transform_and_upload(stock_code, &discovered, data)
            .await
        {
            warn!(stock_code, error = %e, "Logo transform/upload failed");
            metrics.phase_degraded();
        }
    }

    async fn transform_and_upload(
        &self,
        stock_code: &str,
        logo: &DiscoveredLogo,
        data: &mut EnrichmentData,
    ) -> Result<(), ClientError> {
        // Scoped workdir: removed on every exit path, including unwinds
        let workdir = tempfile::tempdir()?;
        let input_name = if logo.is_vector { "input.svg" } else { "input.png" };
        let input_path = workdir.path().join(input_name);
        tokio::fs::write(&input_path, &logo.content).await?;

        let result = self.transformer.transform(&input_path, workdir.path()).await?;
        if !result.success {
            return Err(ClientError::Tool(
                result
                    .error
                    .unwrap_or_else(|| "logo tool reported failure".to_string()),
            ));
        }

        let mut urls = LogoUrls::default();
        for file in &result.output_files {
            let Some(kind) = AssetKind::from_path(file) else {
                debug!(stock_code, file = %file.display(), "Ignoring unrecognised tool output");
                continue;
            };

            let bytes = match tokio::fs::read(file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(stock_code, file = %file.display(), error = %e, "Could not read tool output");
                    continue;
                }
            };

            // No atomicity across objects; a failed upload just means that
            // variant is unavailable this run
            match self
                .storage
                .upload(&kind.object_name(stock_code), bytes, kind.content_type(), CACHE_CONTROL)
                .await
            {
                Ok(url) => urls.set(kind, url),
                Err(e) => {
                    warn!(stock_code, ?kind, error = %e, "Logo upload failed");
                }
            }
        }

        data.logo_url = urls.main_url();
        data.logo_icon_url = urls.icon_url();
        Ok(())
    }
}
