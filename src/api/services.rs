use std::collections::HashMap;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::{Json, extract::State, http::StatusCode, http::header, response::IntoResponse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{EnrichmentJob, JobMessage, JobState};
use crate::worker::IngressDecision;

use super::error::ApiError;
use super::models::{EnqueueRequest, EnqueueResponse, HealthResponse, PushEnvelope};
use super::state::AppState;

/// How long a push-triggered job may keep running after the 200 went out.
/// The platform keeps the instance alive for background work.
const BACKGROUND_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// In-handler deadline for the synchronous drain endpoint.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Push receiver (POST /)
///
/// Decodes the push envelope, applies the same state-based early-return
/// checks as the pull source, then acknowledges with 200 immediately and
/// finishes the job on a background task. Responses:
/// - 200: accepted (including de-duplication and already-terminal)
/// - 400: malformed envelope or payload (dropped by the subscription)
/// - 500: transient store failure (re-delivered)
pub async fn receive_push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let envelope: PushEnvelope = serde_json::from_slice(&body)?;
    let message: JobMessage = envelope
        .decode_job_message()
        .map_err(ApiError::InvalidPayload)?;

    let job_id = message.job_id.clone();

    match state.processor.inspect_job(&job_id) {
        Err(e) => return Err(ApiError::StoreUnavailable(e.to_string())),
        Ok(IngressDecision::Terminal(job_state)) => {
            info!(job_id, state = %job_state, "Push for terminal job, acking");
            return Ok(StatusCode::OK);
        }
        Ok(IngressDecision::InFlight) => {
            info!(job_id, "Push for in-flight job, acking");
            return Ok(StatusCode::OK);
        }
        Ok(IngressDecision::Unknown) => {
            warn!(job_id, "Push for unknown job, acking to drop it");
            return Ok(StatusCode::OK);
        }
        Ok(IngressDecision::Process) => {}
    }

    // Ack inside the push deadline; the actual work continues detached
    let processor = state.processor.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(BACKGROUND_DEADLINE, processor.process_job(&job_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(job_id, error = %e, "Push-triggered job failed"),
            Err(_) => error!(job_id, "Push-triggered job exceeded background deadline"),
        }
    });

    Ok(StatusCode::OK)
}

/// Job creation endpoint (POST /jobs)
///
/// Creates the queued job row and, in pull mode, publishes the matching
/// message. Returns 202 Accepted with the new job id.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stock_code = request.stock_code.trim().to_uppercase();
    if !is_valid_stock_code(&stock_code) {
        return Err(ApiError::InvalidPayload(format!(
            "stock code must be 3-4 alphanumeric characters, got {:?}",
            request.stock_code
        )));
    }

    // Time-sortable id keeps the jobs partition in creation order
    let job_id = Uuid::now_v7().to_string();
    let job = EnrichmentJob::new(job_id.clone(), stock_code.clone(), request.force);

    state
        .store
        .insert_job(&job)
        .map_err(|e| ApiError::Internal(format!("Failed to store job: {}", e)))?;

    if let Some(queue) = &state.queue {
        let message = JobMessage {
            job_id: job_id.clone(),
            stock_code: stock_code.clone(),
            force: request.force,
        };
        queue
            .publish(&message)
            .map_err(|e| ApiError::Internal(format!("Failed to publish job message: {}", e)))?;
    }

    info!(job_id, stock_code, force = request.force, "Job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse { job_id }),
    ))
}

/// Job status endpoint (GET /jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .get_job(&job_id)
        .map_err(|e| ApiError::Internal(format!("Failed to get job: {}", e)))?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok((StatusCode::OK, Json(job)))
}

/// Manual drain endpoint (POST /process-queued)
///
/// Walks the queued jobs synchronously and streams one progress line per
/// job, so the connection keeps the worker warm until the drain finishes.
/// Bounded by an in-handler deadline.
pub async fn process_queued(State(state): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(16);
    let processor = state.processor.clone();

    tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        let jobs = match processor
            .store()
            .list_jobs(usize::MAX, 0, Some(JobState::Queued))
        {
            Ok((jobs, _)) => jobs,
            Err(e) => {
                let _ = tx.send(format!("Failed to list queued jobs: {}\n", e)).await;
                return;
            }
        };

        for job in jobs {
            if tokio::time::Instant::now() >= deadline {
                let _ = tx.send("Deadline reached, stopping drain\n".to_string()).await;
                break;
            }

            let _ = tx
                .send(format!(
                    "Processing job {} for stock {}...\n",
                    job.job_id, job.stock_code
                ))
                .await;

            match processor.process_job(&job.job_id).await {
                Ok(()) => {
                    succeeded += 1;
                    let _ = tx
                        .send(format!("  SUCCESS: job {} completed\n", job.job_id))
                        .await;
                }
                Err(e) => {
                    failed += 1;
                    let _ = tx.send(format!("  FAILED: {}\n", e)).await;
                }
            }
        }

        let _ = tx
            .send(format!("Completed: {} succeeded, {} failed\n", succeeded, failed))
            .await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|line| Ok::<_, std::convert::Infallible>(Bytes::from(line)));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
}

/// Health check endpoint (GET /health)
///
/// Returns 200 OK while the store and queue answer; 503 otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let ledger_healthy = state.store.stats().is_ok();
    components.insert(
        "ledger".to_string(),
        if ledger_healthy { "healthy" } else { "unhealthy" }.to_string(),
    );

    if let Some(queue) = &state.queue {
        let queue_healthy = queue.health_check().is_ok();
        components.insert(
            "queue".to_string(),
            if queue_healthy { "healthy" } else { "unhealthy" }.to_string(),
        );
    }

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// Stock codes are 3-4 alphanumeric characters.
fn is_valid_stock_code(code: &str) -> bool {
    (3..=4).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric())
}
