//! LLM provider clients for company enrichment
//!
//! Two providers are supported: any OpenAI-compatible chat-completions
//! endpoint (model names starting with "gpt") and Google Gemini (model
//! names starting with "gemini"). Selection happens once at startup from
//! the configured model name; the processor only sees
//! [`CompanyEnricher`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::model::{EnrichmentData, QualityScore};

use super::{CompanyEnricher, EnrichError, EnrichmentRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const ENRICH_INSTRUCTION: &str = "You are a financial data analyst. Using the provided company \
     details, scraped website metadata and report list, produce an enriched company profile. \
     Respond with a single JSON object and nothing else.";

const QUALITY_INSTRUCTION: &str = "Score the following enrichment bundle for completeness and \
     plausibility. Respond with a single JSON object {\"overall_score\": <0..1>, \
     \"warnings\": [<string>]} and nothing else.";

/// Build the enricher matching a configured model name. Returns `None`
/// for model names outside the supported set; config validation reports
/// that as a fatal startup error.
pub fn select_enricher(
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Option<Arc<dyn CompanyEnricher>> {
    if model.starts_with("gpt") {
        Some(Arc::new(OpenAiEnricher::new(model, api_key, base_url)))
    } else if model.starts_with("gemini") {
        Some(Arc::new(GeminiEnricher::new(model, api_key)))
    } else {
        None
    }
}

fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("reqwest client construction cannot fail with static options")
}

/// Map a reqwest failure to the enrichment error taxonomy: anything
/// network-shaped is transient, a 4xx means the request itself is bad.
fn classify_status(status: reqwest::StatusCode, body: String) -> EnrichError {
    if status.is_client_error() {
        EnrichError::BadInput(format!("HTTP {}: {}", status.as_u16(), body))
    } else {
        EnrichError::Transient(format!("HTTP {}: {}", status.as_u16(), body))
    }
}

/// Models respond with markdown fences often enough that we strip them
/// before parsing.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn parse_enrichment(content: &str) -> Result<EnrichmentData, EnrichError> {
    let cleaned = strip_code_fences(content);
    if cleaned.is_empty() {
        return Err(EnrichError::BadInput(
            "enrichment returned empty content".to_string(),
        ));
    }
    serde_json::from_str(cleaned)
        .map_err(|e| EnrichError::BadInput(format!("enrichment is not valid JSON: {}", e)))
}

fn parse_quality(content: &str) -> Result<QualityScore, EnrichError> {
    let cleaned = strip_code_fences(content);
    let mut score: QualityScore = serde_json::from_str(cleaned)
        .map_err(|e| EnrichError::BadInput(format!("quality score is not valid JSON: {}", e)))?;
    score.overall_score = score.overall_score.clamp(0.0, 1.0);
    Ok(score)
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiEnricher {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEnricher {
    pub fn new(model: &str, api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            client: http_client(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn chat(&self, system: &str, user: serde_json::Value) -> Result<String, EnrichError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user.to_string()},
            ],
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Transient(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EnrichError::BadInput("enrichment returned empty content".to_string()))
    }
}

#[async_trait]
impl CompanyEnricher for OpenAiEnricher {
    fn provider(&self) -> &str {
        "gpt"
    }

    async fn enrich_company(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError> {
        debug!(stock_code = request.stock_code, model = %self.model, "Requesting enrichment");
        let user = serde_json::to_value(request)
            .map_err(|e| EnrichError::BadInput(e.to_string()))?;
        let content = self.chat(ENRICH_INSTRUCTION, user).await?;
        parse_enrichment(&content)
    }

    async fn evaluate_quality(
        &self,
        stock_code: &str,
        data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError> {
        debug!(stock_code, model = %self.model, "Requesting quality evaluation");
        let user = serde_json::to_value(data).map_err(|e| EnrichError::BadInput(e.to_string()))?;
        let content = self.chat(QUALITY_INSTRUCTION, user).await?;
        parse_quality(&content)
    }
}

/// Google Gemini generateContent client
pub struct GeminiEnricher {
    client: Client,
    model: String,
    api_key: String,
}

impl GeminiEnricher {
    pub fn new(model: &str, api_key: &str) -> Self {
        Self {
            client: http_client(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn generate(&self, instruction: &str, user: serde_json::Value) -> Result<String, EnrichError> {
        let body = json!({
            "system_instruction": {"parts": [{"text": instruction}]},
            "contents": [{"parts": [{"text": user.to_string()}]}],
            "generationConfig": {"response_mime_type": "application/json"},
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        #[derive(Deserialize)]
        struct GenerateResponse {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }
        #[derive(Deserialize)]
        struct Content {
            parts: Vec<Part>,
        }
        #[derive(Deserialize)]
        struct Part {
            text: Option<String>,
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Transient(format!("malformed response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| EnrichError::BadInput("enrichment returned empty content".to_string()))
    }
}

#[async_trait]
impl CompanyEnricher for GeminiEnricher {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn enrich_company(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentData, EnrichError> {
        debug!(stock_code = request.stock_code, model = %self.model, "Requesting enrichment");
        let user = serde_json::to_value(request)
            .map_err(|e| EnrichError::BadInput(e.to_string()))?;
        let content = self.generate(ENRICH_INSTRUCTION, user).await?;
        parse_enrichment(&content)
    }

    async fn evaluate_quality(
        &self,
        stock_code: &str,
        data: &EnrichmentData,
    ) -> Result<QualityScore, EnrichError> {
        debug!(stock_code, model = %self.model, "Requesting quality evaluation");
        let user = serde_json::to_value(data).map_err(|e| EnrichError::BadInput(e.to_string()))?;
        let content = self.generate(QUALITY_INSTRUCTION, user).await?;
        parse_quality(&content)
    }
}
