//! Delivery loops that feed the processor
//!
//! Two of the three delivery sources live here: the pull delivery workers
//! (fed by `queue::PullSubscriber`) and the local ledger poller used when
//! no queue is configured. The push source is the HTTP receiver in `api`.
//! All of them call into the same [`JobProcessor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::model::JobState;
use crate::queue::{Delivery, JobQueue};

use super::processor::{Disposition, JobProcessor, ProcessError};

/// Batch size for the local poller, matching the pull batch.
const POLL_LIMIT: usize = 10;

/// One pull delivery worker: receives dispatched messages, runs the
/// processor, settles the message. A job picked up before shutdown runs to
/// completion under its own deadline; only the receive side is interrupted.
pub async fn run_delivery_worker(
    worker_id: usize,
    mut deliveries: mpsc::Receiver<Delivery>,
    queue: Arc<JobQueue>,
    processor: Arc<JobProcessor>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id, "Delivery worker started");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let seq = delivery.seq;
        match processor.handle_message(&delivery.message).await {
            Disposition::Ack => {
                if let Err(e) = queue.ack(seq) {
                    error!(worker_id, seq, error = %e, "Failed to ack message");
                }
            }
            Disposition::Nack => queue.nack(seq),
        }
    }

    info!(worker_id, "Delivery worker stopped");
}

/// Local polling source: when no queue is configured, scan the ledger for
/// queued jobs every tick and process them in creation order.
pub async fn run_poller(
    processor: Arc<JobProcessor>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval = ?poll_interval, "Local poller started");
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let jobs = match processor
                    .store()
                    .list_jobs(POLL_LIMIT, 0, Some(JobState::Queued))
                {
                    Ok((jobs, _)) => jobs,
                    Err(e) => {
                        error!(error = %e, "Queued-job scan failed");
                        continue;
                    }
                };

                for job in jobs {
                    if *shutdown.borrow() {
                        break;
                    }
                    match processor.process_job(&job.job_id).await {
                        Ok(()) => {}
                        Err(ProcessError::AlreadyClaimed) => {
                            debug!(job_id = %job.job_id, "Job claimed elsewhere between scan and run");
                        }
                        Err(e) => {
                            warn!(job_id = %job.job_id, error = %e, "Polled job failed");
                        }
                    }
                }
            }
        }
    }

    info!("Local poller stopped");
}
