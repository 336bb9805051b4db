//! API models for the push receiver and admin endpoints.
//!
//! The push receiver accepts the standard push envelope: the job message
//! is base64-encoded JSON inside `message.data`:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "eyJqb2JfaWQiOiJqMSIsInN0b2NrX2NvZGUiOiJETVAiLCJmb3JjZSI6ZmFsc2V9",
//!     "attributes": {},
//!     "messageId": "1234567890",
//!     "publishTime": "2024-05-01T10:00:00Z"
//!   },
//!   "subscription": "projects/p/subscriptions/enrichment"
//! }
//! ```

use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::model::JobMessage;

/// Push delivery envelope
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Base64-encoded JSON `JobMessage`
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    #[serde(rename = "publishTime", default)]
    pub publish_time: String,
}

impl PushEnvelope {
    /// Decode the wrapped job message. Any failure here means the payload
    /// is malformed and the delivery can never succeed.
    pub fn decode_job_message(&self) -> Result<JobMessage, String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.message.data)
            .map_err(|e| format!("invalid base64 payload: {}", e))?;
        serde_json::from_slice(&bytes).map_err(|e| format!("invalid job message: {}", e))
    }
}

/// Body for `POST /jobs`
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub stock_code: String,
    #[serde(default)]
    pub force: bool,
}

/// Response for `POST /jobs`
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
