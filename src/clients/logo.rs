//! Logo discovery and the external logo-tool boundary
//!
//! Discovery probes the conventional logo locations on the company site
//! and, when a web-search API key is configured, falls back to an image
//! search. The transformer shells out to the external logo tool; its
//! stdout is parsed exactly once, here, into [`TransformResult`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ClientError, DiscoveredLogo, LogoDiscoverer, LogoTransformer, TransformResult};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(20);

/// Conventional logo paths probed in order, best candidates first.
const CANDIDATE_PATHS: &[&str] = &[
    "logo.svg",
    "assets/logo.svg",
    "images/logo.svg",
    "logo.png",
    "assets/logo.png",
    "apple-touch-icon.png",
    "favicon.ico",
];

pub struct HttpLogoDiscoverer {
    client: reqwest::Client,
    search_api_key: Option<String>,
}

impl HttpLogoDiscoverer {
    pub fn new(search_api_key: Option<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .user_agent(format!("enrichd/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            search_api_key,
        })
    }

    /// Try one candidate URL; `None` means "keep looking" (non-image
    /// responses and fetch failures are expected while probing).
    async fn try_fetch(&self, url: &str) -> Option<DiscoveredLogo> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "Logo candidate fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let media_type: Option<mime::Mime> = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let is_vector = media_type
            .as_ref()
            .is_some_and(|m| m.subtype().as_str().contains("svg"))
            || url.ends_with(".svg");
        let is_image = is_vector
            || media_type
                .as_ref()
                .is_some_and(|m| m.type_() == mime::IMAGE);
        if !is_image {
            return None;
        }

        let content = match response.bytes().await {
            Ok(b) if !b.is_empty() => b,
            _ => return None,
        };

        Some(DiscoveredLogo {
            source_url: url.to_string(),
            content,
            is_vector,
        })
    }

    /// Auxiliary discovery path via the Brave image-search API. Only
    /// active when a key is configured; failures just end the probe.
    async fn search_logo(&self, company_name: &str, stock_code: &str) -> Option<DiscoveredLogo> {
        let key = self.search_api_key.as_ref()?;

        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            results: Vec<SearchResult>,
        }
        #[derive(Deserialize)]
        struct SearchResult {
            properties: Option<SearchProperties>,
        }
        #[derive(Deserialize)]
        struct SearchProperties {
            url: Option<String>,
        }

        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/images/search")
            .header("X-Subscription-Token", key)
            .query(&[("q", format!("{} {} logo", company_name, stock_code)), ("count", "3".to_string())])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Logo search request rejected");
            return None;
        }

        let parsed: SearchResponse = response.json().await.ok()?;
        for result in parsed.results {
            if let Some(url) = result.properties.and_then(|p| p.url) {
                if let Some(logo) = self.try_fetch(&url).await {
                    return Some(logo);
                }
            }
        }
        None
    }
}

#[async_trait]
impl LogoDiscoverer for HttpLogoDiscoverer {
    async fn discover_logo(
        &self,
        website: &str,
        company_name: &str,
        stock_code: &str,
    ) -> Result<Option<DiscoveredLogo>, ClientError> {
        let base = website.trim_end_matches('/');

        for path in CANDIDATE_PATHS {
            let url = format!("{}/{}", base, path);
            if let Some(logo) = self.try_fetch(&url).await {
                debug!(stock_code, url = %logo.source_url, "Logo discovered on site");
                return Ok(Some(logo));
            }
        }

        if let Some(logo) = self.search_logo(company_name, stock_code).await {
            debug!(stock_code, url = %logo.source_url, "Logo discovered via search");
            return Ok(Some(logo));
        }

        debug!(stock_code, website, "No logo discovered");
        Ok(None)
    }
}

/// Subprocess wrapper around the external logo tool.
///
/// Invocation: `{binary} <input> --out-dir <dir> --json`. The tool writes
/// its variants (`logo.png`, `logo.svg`, `logo_icon.png`, `logo_icon.svg`)
/// into the output directory and reports what it produced as one JSON
/// object on stdout. Partial failure is normal (e.g. rasterization
/// succeeded but icon extraction did not) and shows up as
/// `success: true` with a subset of files.
pub struct SvgCliTransformer {
    binary: PathBuf,
}

impl SvgCliTransformer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Tool stdout schema; parsed at this boundary only.
#[derive(Debug, Deserialize)]
struct RawToolOutcome {
    success: bool,
    #[serde(default)]
    output_files: Vec<String>,
    #[serde(default)]
    has_icon: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl LogoTransformer for SvgCliTransformer {
    async fn transform(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<TransformResult, ClientError> {
        debug!(input = %input.display(), "Invoking logo tool");

        let output = Command::new(&self.binary)
            .arg(input)
            .arg("--out-dir")
            .arg(output_dir)
            .arg("--json")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ClientError::Tool(format!("failed to launch {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(TransformResult {
                success: false,
                error: Some(format!("exit {}: {}", output.status, stderr.trim())),
                ..Default::default()
            });
        }

        let raw: RawToolOutcome = serde_json::from_slice(&output.stdout).map_err(|e| {
            ClientError::Tool(format!("unparseable logo tool output: {}", e))
        })?;

        let output_files = raw
            .output_files
            .into_iter()
            .map(|f| {
                let path = PathBuf::from(&f);
                if path.is_absolute() {
                    path
                } else {
                    output_dir.join(path)
                }
            })
            .collect();

        Ok(TransformResult {
            success: raw.success,
            output_files,
            has_icon: raw.has_icon,
            error: raw.error,
        })
    }
}
