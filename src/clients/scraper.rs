//! HTTP scraper for company websites
//!
//! One reqwest client serves both collaborator roles: metadata scraping
//! (title / description / keywords out of the landing page) and the
//! financial-report crawl (document links that look like annual reports).
//! Extraction is deliberately shallow; both phases are degradable and the
//! enrichment provider treats their output as optional hints.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{ClientError, FinancialReport, MetadataScraper, ReportCrawler, ScrapedMetadata};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta\s+[^>]*name=["'](description|keywords)["'][^>]*content=["']([^"']*)["']"#,
    )
    .expect("static regex")
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s+[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("static regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("static regex"));

const MAX_REPORTS: usize = 10;

/// HTTP scraper configuration
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: format!("enrichd/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new(config: ScraperConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedResponse(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))
    }
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve an href against the site root. Only handles the shapes that
/// actually show up in landing pages; anything else is returned as-is.
fn resolve_href(website: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let base = website.trim_end_matches('/');
    if let Some(rest) = href.strip_prefix('/') {
        return format!("{}/{}", base, rest);
    }
    format!("{}/{}", base, href)
}

fn looks_like_report(href: &str, text: &str) -> bool {
    let href_lower = href.to_lowercase();
    let text_lower = text.to_lowercase();
    let topical = ["annual-report", "annual_report", "financial-report", "half-year", "results"]
        .iter()
        .any(|p| href_lower.contains(p))
        || ["annual report", "financial report", "half year", "full year results"]
            .iter()
            .any(|p| text_lower.contains(p));
    topical || (href_lower.ends_with(".pdf") && text_lower.contains("report"))
}

#[async_trait]
impl MetadataScraper for HttpScraper {
    async fn scrape_metadata(
        &self,
        website: &str,
        company_name: &str,
    ) -> Result<ScrapedMetadata, ClientError> {
        debug!(website, company_name, "Scraping site metadata");
        let html = self.fetch_page(website).await?;

        let mut metadata = ScrapedMetadata {
            source_url: website.to_string(),
            ..Default::default()
        };

        if let Some(caps) = TITLE_RE.captures(&html) {
            let title = strip_tags(&caps[1]);
            if !title.is_empty() {
                metadata.title = Some(title);
            }
        }

        for caps in META_RE.captures_iter(&html) {
            let content = caps[2].trim();
            if content.is_empty() {
                continue;
            }
            match caps[1].to_lowercase().as_str() {
                "description" => metadata.description = Some(content.to_string()),
                "keywords" => {
                    metadata.keywords = content
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect();
                }
                _ => {}
            }
        }

        Ok(metadata)
    }
}

#[async_trait]
impl ReportCrawler for HttpScraper {
    async fn crawl_financial_reports(
        &self,
        website: &str,
    ) -> Result<Vec<FinancialReport>, ClientError> {
        debug!(website, "Crawling for financial reports");
        let html = self.fetch_page(website).await?;

        let mut reports = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for caps in LINK_RE.captures_iter(&html) {
            let href = caps[1].trim();
            let text = strip_tags(&caps[2]);
            if !looks_like_report(href, &text) {
                continue;
            }

            let url = resolve_href(website, href);
            if !seen.insert(url.clone()) {
                continue;
            }

            let year = YEAR_RE
                .captures(href)
                .or_else(|| YEAR_RE.captures(&text))
                .and_then(|c| c[1].parse().ok());

            let title = if text.is_empty() { url.clone() } else { text };
            reports.push(FinancialReport { title, url, year });

            if reports.len() >= MAX_REPORTS {
                break;
            }
        }

        debug!(website, count = reports.len(), "Report crawl finished");
        Ok(reports)
    }
}
