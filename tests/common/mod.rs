//! Shared fakes and harness for the integration suites
//!
//! The store and the logo object store are real (temp-dir fjall and
//! in-memory object_store); only the external collaborators are faked.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;

use enrichd::clients::{
    ClientError, CompanyEnricher, DiscoveredLogo, EnrichError, EnrichmentRequest,
    FinancialReport, LogoDiscoverer, LogoTransformer, MetadataScraper, ReportCrawler,
    ScrapedMetadata, TransformResult,
};
use enrichd::ledger::LedgerStore;
use enrichd::model::{EnrichmentData, EnrichmentJob, QualityScore, StockDetails};
use enrichd::observability::Metrics;
use enrichd::storage::StorageClient;
use enrichd::worker::{JobProcessor, LogoPipeline, Pipeline};

pub const QUALITY_THRESHOLD: f64 = 0.7;

/// Scriptable enricher; also records what the pipeline handed it.
pub struct FakeEnricher {
    pub fail_enrich: bool,
    pub fail_quality: bool,
    pub score: f64,
    pub enrich_calls: AtomicUsize,
    pub saw_metadata: Mutex<Option<bool>>,
    pub saw_report_count: Mutex<Option<usize>>,
}

impl FakeEnricher {
    pub fn succeeding(score: f64) -> Self {
        Self {
            fail_enrich: false,
            fail_quality: false,
            score,
            enrich_calls: AtomicUsize::new(0),
            saw_metadata: Mutex::new(None),
            saw_report_count: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_enrich: true,
            ..Self::succeeding(0.85)
        }
    }
}

#[async_trait]
impl CompanyEnricher for FakeEnricher {
    fn provider(&self) -> &str {
        "gpt"
    }

    async fn enrich_company(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError> {
        self.enrich_calls.fetch_add(1, Ordering::SeqCst);
        *self.saw_metadata.lock().unwrap() = Some(request.scraped_metadata.is_some());
        *self.saw_report_count.lock().unwrap() = Some(request.reports.len());

        if self.fail_enrich {
            return Err(EnrichError::Transient("connection reset by peer".into()));
        }

        let mut fields = serde_json::Map::new();
        fields.insert("description".into(), json!("Pizza delivery franchise"));
        fields.insert("sector".into(), json!("consumer discretionary"));
        Ok(EnrichmentData {
            fields,
            logo_url: None,
            logo_icon_url: None,
        })
    }

    async fn evaluate_quality(
        &self,
        _stock_code: &str,
        _data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError> {
        if self.fail_quality {
            return Err(EnrichError::Transient("quality upstream down".into()));
        }
        Ok(QualityScore {
            overall_score: self.score,
            warnings: vec![],
        })
    }
}

/// Enricher that panics mid-phase; exercises the panic guard.
pub struct PanickingEnricher;

#[async_trait]
impl CompanyEnricher for PanickingEnricher {
    fn provider(&self) -> &str {
        "gpt"
    }

    async fn enrich_company(
        &self,
        _request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError> {
        panic!("enricher exploded");
    }

    async fn evaluate_quality(
        &self,
        _stock_code: &str,
        _data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError> {
        Ok(QualityScore::default())
    }
}

/// Enricher slower than any test deadline; exercises the job timeout.
pub struct SlowEnricher;

#[async_trait]
impl CompanyEnricher for SlowEnricher {
    fn provider(&self) -> &str {
        "gpt"
    }

    async fn enrich_company(
        &self,
        _request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(EnrichmentData::default())
    }

    async fn evaluate_quality(
        &self,
        _stock_code: &str,
        _data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError> {
        Ok(QualityScore::default())
    }
}

pub struct FakeScraper {
    pub fail: bool,
}

#[async_trait]
impl MetadataScraper for FakeScraper {
    async fn scrape_metadata(
        &self,
        website: &str,
        _company_name: &str,
    ) -> Result<ScrapedMetadata, ClientError> {
        if self.fail {
            return Err(ClientError::RequestFailed("scrape blew up".into()));
        }
        Ok(ScrapedMetadata {
            title: Some("Example Corp".into()),
            description: Some("An example".into()),
            keywords: vec!["example".into()],
            source_url: website.to_string(),
        })
    }
}

pub struct FakeCrawler {
    pub fail: bool,
}

#[async_trait]
impl ReportCrawler for FakeCrawler {
    async fn crawl_financial_reports(
        &self,
        website: &str,
    ) -> Result<Vec<FinancialReport>, ClientError> {
        if self.fail {
            return Err(ClientError::RequestFailed("crawl blew up".into()));
        }
        Ok(vec![FinancialReport {
            title: "Annual Report 2024".into(),
            url: format!("{}/annual-report-2024.pdf", website.trim_end_matches('/')),
            year: Some(2024),
        }])
    }
}

pub struct FakeDiscoverer {
    /// None = nothing found; Some(is_vector) = a logo with that format
    pub logo: Option<bool>,
    pub fail: bool,
}

#[async_trait]
impl LogoDiscoverer for FakeDiscoverer {
    async fn discover_logo(
        &self,
        _website: &str,
        _company_name: &str,
        _stock_code: &str,
    ) -> Result<Option<DiscoveredLogo>, ClientError> {
        if self.fail {
            return Err(ClientError::RequestFailed("discovery blew up".into()));
        }
        Ok(self.logo.map(|is_vector| DiscoveredLogo {
            source_url: "https://example.com/logo.svg".into(),
            content: Bytes::from_static(b"<svg xmlns='http://www.w3.org/2000/svg'/>"),
            is_vector,
        }))
    }
}

/// Writes the requested output files into the tool's output directory and
/// reports them, mimicking a (possibly partial) tool run.
pub struct FakeTransformer {
    pub files: Vec<&'static str>,
    pub success: bool,
}

#[async_trait]
impl LogoTransformer for FakeTransformer {
    async fn transform(
        &self,
        _input: &std::path::Path,
        output_dir: &std::path::Path,
    ) -> Result<TransformResult, ClientError> {
        let mut output_files = Vec::new();
        for name in &self.files {
            let path = output_dir.join(name);
            tokio::fs::write(&path, b"image-bytes").await?;
            output_files.push(path);
        }
        let has_icon = self.files.iter().any(|f| f.contains("icon"));
        Ok(TransformResult {
            success: self.success,
            output_files,
            has_icon,
            error: None,
        })
    }
}

pub struct Harness {
    pub store: Arc<LedgerStore>,
    pub processor: Arc<JobProcessor>,
    pub metrics: Arc<Metrics>,
    _tmp: TempDir,
}

pub struct HarnessBuilder {
    enricher: Arc<dyn CompanyEnricher>,
    scraper_fails: bool,
    crawler_fails: bool,
    logo: Option<LogoPipeline>,
    job_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new(enricher: Arc<dyn CompanyEnricher>) -> Self {
        Self {
            enricher,
            scraper_fails: false,
            crawler_fails: false,
            logo: None,
            job_timeout: Duration::from_secs(30),
        }
    }

    pub fn scraper_fails(mut self) -> Self {
        self.scraper_fails = true;
        self
    }

    pub fn crawler_fails(mut self) -> Self {
        self.crawler_fails = true;
        self
    }

    pub fn with_logo(mut self, logo: LogoPipeline) -> Self {
        self.logo = Some(logo);
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(tmp.path().join("ledger")).unwrap());
        let metrics = Arc::new(Metrics::new());

        let pipeline = Arc::new(Pipeline::new(
            self.enricher,
            Arc::new(FakeScraper {
                fail: self.scraper_fails,
            }),
            Arc::new(FakeCrawler {
                fail: self.crawler_fails,
            }),
            self.logo,
            QUALITY_THRESHOLD,
            metrics.clone(),
        ));

        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            pipeline,
            self.job_timeout,
            metrics.clone(),
        ));

        Harness {
            store,
            processor,
            metrics,
            _tmp: tmp,
        }
    }
}

/// Logo pipeline wired with fakes and an in-memory object store. Returns
/// the pipeline plus a storage handle for asserting uploads.
pub fn fake_logo_pipeline(
    discovered: Option<bool>,
    files: Vec<&'static str>,
) -> (LogoPipeline, StorageClient) {
    let storage = StorageClient::in_memory();
    let pipeline = LogoPipeline {
        discoverer: Arc::new(FakeDiscoverer {
            logo: discovered,
            fail: false,
        }),
        transformer: Arc::new(FakeTransformer {
            files,
            success: true,
        }),
        storage: storage.clone(),
    };
    (pipeline, storage)
}

pub fn seed_stock(store: &LedgerStore, stock_code: &str, enrichment_status: &str) {
    store
        .put_stock_details(&StockDetails {
            stock_code: stock_code.to_string(),
            company_name: "Domino Pizza Enterprises".to_string(),
            industry: Some("Consumer Discretionary".to_string()),
            website: Some("https://example.com".to_string()),
            summary: Some("Pizza".to_string()),
            enrichment_status: enrichment_status.to_string(),
        })
        .unwrap();
}

pub fn seed_queued_job(store: &LedgerStore, job_id: &str, stock_code: &str, force: bool) {
    store
        .insert_job(&EnrichmentJob::new(job_id, stock_code, force))
        .unwrap();
}
