//! Per-job orchestration: claim, run the pipeline, record the outcome
//!
//! Every delivery source funnels into [`JobProcessor`]. The processor owns
//! the job state machine:
//!
//! - `queued -> processing` happens through a compare-and-swap claim, so
//!   two sources racing for the same job cannot both run it
//! - the pipeline executes on its own task under the job deadline; a panic
//!   in any phase is caught at the join and becomes a `failed` record
//! - a terminal mark tracks whether a terminal transition was written; if
//!   the run is returning an error without one, the safety-net writes
//!   `failed` on the way out

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerStore};
use crate::model::{JobMessage, JobState};
use crate::observability::Metrics;

use super::pipeline::{Pipeline, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("stock details not found for {0}")]
    StockNotFound(String),

    #[error("stock {0} already enriched (re-run with force to replace it)")]
    AlreadyEnriched(String),

    #[error("job already claimed by another worker")]
    AlreadyClaimed,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("processing timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("panic during processing: {0}")]
    Panicked(String),

    #[error("processing cancelled: {0}")]
    Cancelled(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl ProcessError {
    /// Permanent logical failures are acknowledged rather than retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProcessError::AlreadyEnriched(_))
    }

    /// A lost claim means another worker owns the row; the safety-net must
    /// not write over their state.
    fn skips_safety_net(&self) -> bool {
        matches!(self, ProcessError::AlreadyClaimed)
    }
}

/// Settlement decision for a pulled or pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

/// What the authoritative job row says about an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressDecision {
    /// Job is queued; run it.
    Process,
    /// Job is already terminal; nothing to do.
    Terminal(JobState),
    /// Another worker holds the job.
    InFlight,
    /// No such job row; the message can never succeed.
    Unknown,
}

/// Tracks whether a terminal transition has been recorded for the job, so
/// the safety-net does not double-update.
#[derive(Debug, Default)]
struct TerminalMark {
    recorded: bool,
}

impl TerminalMark {
    fn mark(&mut self) {
        self.recorded = true;
    }
}

pub struct JobProcessor {
    store: Arc<LedgerStore>,
    pipeline: Arc<Pipeline>,
    job_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<LedgerStore>,
        pipeline: Arc<Pipeline>,
        job_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            pipeline,
            job_timeout,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Read the authoritative row and decide what an incoming message
    /// means. Shared by all delivery sources so the de-duplication rules
    /// exist exactly once.
    pub fn inspect_job(&self, job_id: &str) -> Result<IngressDecision, LedgerError> {
        match self.store.get_job(job_id)? {
            None => Ok(IngressDecision::Unknown),
            Some(job) if job.state.is_terminal() => Ok(IngressDecision::Terminal(job.state)),
            Some(job) if job.state == JobState::Processing => Ok(IngressDecision::InFlight),
            Some(_) => Ok(IngressDecision::Process),
        }
    }

    /// Entry point for the pull source: settle one delivered message.
    ///
    /// The message only routes; the effective command comes from the
    /// stored row. Terminal and in-flight jobs acknowledge without work.
    pub async fn handle_message(&self, message: &JobMessage) -> Disposition {
        let job_id = message.job_id.as_str();

        match self.inspect_job(job_id) {
            Err(e) => {
                error!(job_id, error = %e, "Job read failed, retrying message");
                return Disposition::Nack;
            }
            Ok(IngressDecision::Terminal(state)) => {
                debug!(job_id, %state, "Job already terminal, acking");
                return Disposition::Ack;
            }
            Ok(IngressDecision::InFlight) => {
                debug!(job_id, "Job already processing elsewhere, acking");
                return Disposition::Ack;
            }
            Ok(IngressDecision::Unknown) => {
                warn!(job_id, "Message for unknown job, acking to drop it");
                return Disposition::Ack;
            }
            Ok(IngressDecision::Process) => {}
        }

        match self.process_job(job_id).await {
            Ok(()) => Disposition::Ack,
            Err(e) if e.is_permanent() => {
                info!(job_id, error = %e, "Permanent failure, acking");
                Disposition::Ack
            }
            Err(e) => {
                warn!(job_id, error = %e, "Processing failed, retrying message");
                Disposition::Nack
            }
        }
    }

    /// Process one job end to end. On a non-error return the job is
    /// `completed` with its `enrichment_id` set; on an error return it is
    /// `failed` with a message (written by the normal path or by the
    /// safety-net here).
    pub async fn process_job(&self, job_id: &str) -> Result<(), ProcessError> {
        let mut terminal = TerminalMark::default();
        let result = self.run(job_id, &mut terminal).await;

        if let Err(err) = &result {
            if !terminal.recorded && !err.skips_safety_net() {
                // Safety-net: the normal path did not reach a terminal
                // transition; record the failure now.
                if let Err(update_err) = self.store.update_job_status(
                    job_id,
                    JobState::Failed,
                    None,
                    Some(&err.to_string()),
                ) {
                    error!(job_id, error = %update_err, "Safety-net status update failed");
                }
            }
            self.metrics.job_failed();
        } else {
            self.metrics.job_completed();
        }

        result
    }

    async fn run(&self, job_id: &str, terminal: &mut TerminalMark) -> Result<(), ProcessError> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| ProcessError::JobNotFound(job_id.to_string()))?;

        if !self.store.try_claim(job_id)? {
            return Err(ProcessError::AlreadyClaimed);
        }
        self.metrics.job_started();
        info!(job_id, stock_code = %job.stock_code, force = job.force, "Processing job");

        let stock = match self.store.get_stock_details(&job.stock_code)? {
            Some(stock) => stock,
            None => {
                let err = ProcessError::StockNotFound(job.stock_code.clone());
                self.store.update_job_status(
                    job_id,
                    JobState::Failed,
                    None,
                    Some(&err.to_string()),
                )?;
                terminal.mark();
                return Err(err);
            }
        };

        // Force is taken from the stored row, never the message
        if stock.is_enriched() && !job.force {
            let err = ProcessError::AlreadyEnriched(job.stock_code.clone());
            self.store.update_job_status(
                job_id,
                JobState::Failed,
                None,
                Some(&err.to_string()),
            )?;
            terminal.mark();
            return Err(err);
        }

        // Phases run on their own task: the join is both the deadline
        // boundary and the panic guard
        let pipeline = Arc::clone(&self.pipeline);
        let job_for_task = job.clone();
        let stock_for_task = stock.clone();
        let mut handle =
            tokio::spawn(async move { pipeline.run(&job_for_task, &stock_for_task).await });

        let phase_result = match tokio::time::timeout(self.job_timeout, &mut handle).await {
            Err(_) => {
                handle.abort();
                Err(ProcessError::Timeout {
                    seconds: self.job_timeout.as_secs(),
                })
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    Err(ProcessError::Panicked(panic_message(join_err)))
                } else {
                    Err(ProcessError::Cancelled(join_err.to_string()))
                }
            }
            Ok(Ok(Err(pipeline_err))) => Err(ProcessError::Pipeline(pipeline_err)),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
        };

        let outcome = match phase_result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.store.update_job_status(
                    job_id,
                    JobState::Failed,
                    None,
                    Some(&err.to_string()),
                )?;
                terminal.mark();
                return Err(err);
            }
        };

        let candidate_id = Uuid::now_v7().to_string();
        let enrichment_id = match self.store.save_pending_enrichment(
            &candidate_id,
            &job.stock_code,
            outcome.data,
            outcome.quality,
        ) {
            Ok(id) => id,
            Err(e) => {
                let err = ProcessError::Ledger(e);
                self.store.update_job_status(
                    job_id,
                    JobState::Failed,
                    None,
                    Some(&err.to_string()),
                )?;
                terminal.mark();
                return Err(err);
            }
        };

        // The artifact is saved; a failed completion update is logged only.
        // The stuck-job sweeper re-queues the row eventually.
        match self.store.update_job_status(
            job_id,
            JobState::Completed,
            Some(&enrichment_id),
            None,
        ) {
            Ok(()) => {
                terminal.mark();
                info!(job_id, enrichment_id = %enrichment_id, "Job completed");
            }
            Err(e) => {
                error!(
                    job_id,
                    enrichment_id = %enrichment_id,
                    error = %e,
                    "Artifact saved but completion update failed; sweeper will recover the job"
                );
            }
        }

        Ok(())
    }
}

/// Extract a readable message from a panicked task.
fn panic_message(join_err: tokio::task::JoinError) -> String {
    match join_err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_message_str() {
        let handle = tokio::spawn(async {
            panic!("boom");
        });
        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(panic_message(err), "boom");
    }

    #[tokio::test]
    async fn test_panic_message_formatted() {
        let handle = tokio::spawn(async {
            panic!("boom {}", 42);
        });
        let err = handle.await.unwrap_err();
        assert_eq!(panic_message(err), "boom 42");
    }

    #[test]
    fn test_permanent_errors() {
        assert!(ProcessError::AlreadyEnriched("DMP".into()).is_permanent());
        assert!(!ProcessError::Timeout { seconds: 600 }.is_permanent());
        assert!(!ProcessError::Panicked("x".into()).is_permanent());
    }

    #[test]
    fn test_error_messages() {
        let err = ProcessError::AlreadyEnriched("DMP".into());
        assert!(err.to_string().contains("already enriched"));

        let err = ProcessError::Timeout { seconds: 600 };
        assert!(err.to_string().contains("timed out"));

        let err = ProcessError::Panicked("boom".into());
        assert!(err.to_string().starts_with("panic during processing"));
    }
}
