/// Stuck-job recovery and completed-job retention
///
/// Both sweeps are idempotent and only touch rows whose state and
/// timestamps show they are definitely eligible, so they are safe to run
/// concurrently with active processing. Callers hold the store's
/// transition lock for the duration of a sweep.
use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use fjall::PartitionHandle;
use tracing::{info, warn};

use crate::model::{EnrichmentJob, JobState};

use super::error::Result;
use super::partitions::encode_job_key;

/// Transition every job in `processing` whose `updated_at` is older than
/// `now - threshold` back to `queued`. Returns the number of rows changed.
pub fn reset_stuck_jobs(jobs: &PartitionHandle, threshold: Duration) -> Result<usize> {
    let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::minutes(5));
    let cutoff = Utc::now() - threshold;

    let mut stuck = Vec::new();
    for item in jobs.iter() {
        let (_, value) = item?;
        let job: EnrichmentJob = serde_json::from_slice(&value)?;
        if job.state == JobState::Processing && job.updated_at < cutoff {
            stuck.push(job);
        }
    }

    let count = stuck.len();
    for mut job in stuck {
        warn!(
            job_id = %job.job_id,
            stock_code = %job.stock_code,
            stuck_since = %job.updated_at,
            "Resetting stuck job to queued"
        );
        job.state = JobState::Queued;
        job.updated_at = Utc::now();
        jobs.insert(encode_job_key(&job.job_id), serde_json::to_vec(&job)?)?;
    }

    if count > 0 {
        info!(count, "Stuck jobs reset");
    }
    Ok(count)
}

/// For each stock code, retain the `keep_per_stock` most recently updated
/// `completed` jobs and delete the rest. `failed` and `cancelled` rows are
/// never touched. Returns the number of rows deleted.
pub fn cleanup_old_completed(jobs: &PartitionHandle, keep_per_stock: usize) -> Result<usize> {
    let mut by_stock: HashMap<String, Vec<EnrichmentJob>> = HashMap::new();

    for item in jobs.iter() {
        let (_, value) = item?;
        let job: EnrichmentJob = serde_json::from_slice(&value)?;
        if job.state == JobState::Completed {
            by_stock.entry(job.stock_code.clone()).or_default().push(job);
        }
    }

    let mut deleted = 0;
    for (stock_code, mut completed) in by_stock {
        if completed.len() <= keep_per_stock {
            continue;
        }
        // Most recent first; everything past the keep window goes
        completed.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        for job in completed.drain(keep_per_stock..) {
            jobs.remove(encode_job_key(&job.job_id))?;
            deleted += 1;
        }
        info!(stock_code = %stock_code, "Trimmed completed job history");
    }

    if deleted > 0 {
        info!(deleted, "Old completed jobs removed");
    }
    Ok(deleted)
}
