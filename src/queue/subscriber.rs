use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::store::{Delivery, JobQueue, Result};

const POLL_BATCH: usize = 10;

/// PullSubscriber drives the pull delivery source.
///
/// Architecture:
/// 1. A single receive loop polls the embedded [`JobQueue`]
/// 2. Deliveries fan out round-robin over bounded mpsc channels
/// 3. One delivery worker per channel claims and processes the job, then
///    settles the message (ack/nack) against the queue
/// 4. Backpressure via the bounded channels
///
/// The delivery workers themselves live in `worker::sources`; this type
/// only owns distribution.
pub struct PullSubscriber {
    queue: Arc<JobQueue>,
    worker_channels: Vec<mpsc::Sender<Delivery>>,
    next_worker: AtomicUsize,
    poll_interval: Duration,
}

impl PullSubscriber {
    /// Create a subscriber with `num_workers` delivery channels.
    ///
    /// Returns:
    /// - the subscriber (runs the receive loop)
    /// - one receiver per delivery worker, for spawning workers
    pub fn new(
        queue: Arc<JobQueue>,
        num_workers: usize,
        channel_size: usize,
        poll_interval: Duration,
    ) -> (Self, Vec<mpsc::Receiver<Delivery>>) {
        info!(num_workers, channel_size, "Creating pull subscriber");

        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            worker_receivers.push(rx);
            debug!(worker_id, "Created delivery channel");
        }

        let subscriber = Self {
            queue,
            worker_channels,
            next_worker: AtomicUsize::new(0),
            poll_interval,
        };

        (subscriber, worker_receivers)
    }

    /// Continuous receive loop. Stops accepting new deliveries once the
    /// shutdown signal fires; in-flight jobs finish under their own
    /// deadline in the delivery workers.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Pull subscriber stopping");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.dispatch_batch().await {
                        // Transient receive failure: log and let the next
                        // tick retry.
                        error!(error = %e, "Queue poll failed");
                    }
                }
            }
        }

        Ok(())
    }

    async fn dispatch_batch(&self) -> Result<()> {
        let deliveries = self.queue.poll(POLL_BATCH)?;

        for delivery in deliveries {
            let worker_idx =
                self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
            let seq = delivery.seq;

            // Bounded channel: waiting here is the backpressure
            if self.worker_channels[worker_idx].send(delivery).await.is_err() {
                warn!(seq, worker_idx, "Delivery worker gone, returning message to queue");
                self.queue.nack(seq);
            } else {
                debug!(seq, worker_idx, "Delivery dispatched");
            }
        }

        Ok(())
    }

    /// Check if all delivery channels are healthy (not closed)
    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobMessage;
    use tempfile::TempDir;

    fn create_test_message(job_id: &str) -> JobMessage {
        JobMessage {
            job_id: job_id.to_string(),
            stock_code: "DMP".to_string(),
            force: false,
        }
    }

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(JobQueue::open(temp_dir.path()).unwrap());

        for i in 0..4 {
            queue.publish(&create_test_message(&format!("job{}", i))).unwrap();
        }

        let (subscriber, mut receivers) =
            PullSubscriber::new(queue.clone(), 2, 10, Duration::from_millis(10));
        subscriber.dispatch_batch().await.unwrap();

        // Worker 0 gets jobs 0 and 2, worker 1 gets jobs 1 and 3
        assert_eq!(receivers[0].recv().await.unwrap().message.job_id, "job0");
        assert_eq!(receivers[1].recv().await.unwrap().message.job_id, "job1");
        assert_eq!(receivers[0].recv().await.unwrap().message.job_id, "job2");
        assert_eq!(receivers[1].recv().await.unwrap().message.job_id, "job3");
    }

    #[tokio::test]
    async fn test_dead_worker_returns_message() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(JobQueue::open(temp_dir.path()).unwrap());

        let seq = queue.publish(&create_test_message("job1")).unwrap();

        let (subscriber, receivers) =
            PullSubscriber::new(queue.clone(), 1, 10, Duration::from_millis(10));
        drop(receivers); // simulates a crashed delivery worker

        subscriber.dispatch_batch().await.unwrap();
        assert!(!subscriber.health_check());

        // Message went back to the pollable set
        let redelivered = queue.poll(10).unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].seq, seq);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(JobQueue::open(temp_dir.path()).unwrap());

        let (subscriber, _receivers) =
            PullSubscriber::new(queue, 1, 10, Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { subscriber.run(shutdown_rx).await });
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("subscriber did not stop")
            .unwrap()
            .unwrap();
    }
}
