//! Core domain types for enrichment jobs and their artifacts.
//!
//! An [`EnrichmentJob`] is one request to enrich one stock. The worker owns
//! every transition after creation:
//!
//! ```text
//!  queued ──▶ processing ──▶ completed
//!                       └──▶ failed
//! ```
//!
//! `cancelled` is a terminal state reserved for external actors; on ingress
//! the worker treats it the same as `completed` / `failed`.
//!
//! A [`PendingEnrichment`] is the artifact produced by one successful job.
//! Its payload is the provider-produced field bundle, preserved verbatim,
//! plus the logo URL slots the logo phase may stamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job lifecycle state. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One request to enrich one stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub job_id: String,
    pub stock_code: String,
    pub force: bool,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentJob {
    /// Fresh job in `queued`, timestamps set to now.
    pub fn new(job_id: impl Into<String>, stock_code: impl Into<String>, force: bool) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            stock_code: stock_code.into(),
            force,
            state: JobState::Queued,
            enrichment_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Read-only input snapshot for one stock, maintained by a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDetails {
    pub stock_code: String,
    pub company_name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// "completed" once an approved enrichment exists for this stock.
    pub enrichment_status: String,
}

impl StockDetails {
    pub fn is_enriched(&self) -> bool {
        self.enrichment_status == "completed"
    }
}

/// Review state of a pending enrichment. Freshly produced artifacts always
/// start in `PendingReview`; approval happens downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    PendingReview,
}

/// The artifact produced by one successful job. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEnrichment {
    pub enrichment_id: String,
    pub stock_code: String,
    pub state: ReviewState,
    pub payload: EnrichmentData,
    pub quality: QualityScore,
    pub created_at: DateTime<Utc>,
}

/// The enrichment data bundle. The provider-produced fields are opaque to
/// the worker and pass through untouched; the logo phase may stamp the two
/// URL slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentData {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_icon_url: Option<String>,
}

/// Quality verdict for an enrichment bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall_score: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl QualityScore {
    /// Empty score carrying a single warning; used when quality evaluation
    /// itself fails.
    pub fn degraded(warning: impl Into<String>) -> Self {
        Self {
            overall_score: 0.0,
            warnings: vec![warning.into()],
        }
    }
}

/// Wire record for pull and push delivery. Routing information only: the
/// effective command (in particular `force`) is always re-read from the
/// stored job row, because messages may be re-delivered with stale intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: String,
    pub stock_code: String,
    pub force: bool,
}
