use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::JobMessage;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Message not found: seq={0}")]
    MessageNotFound(u64),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// One message handed to a delivery worker. The worker must settle it
/// with [`JobQueue::ack`] or [`JobQueue::nack`].
#[derive(Clone, Debug)]
pub struct Delivery {
    pub seq: u64,
    pub message: JobMessage,
}

/// Embedded pull-subscription queue backed by Fjall.
///
/// Architecture:
/// - `pending` partition: u64 (big-endian) → JobMessage (JSON)
/// - `metadata` partition: "next_seq" → u64 (atomic counter)
///
/// Sequence keys make polling oldest-first. Acknowledged messages are
/// deleted; negative acknowledgement simply returns the message to the
/// pollable set, so it is re-delivered on a later poll. Messages that were
/// in flight when the process died re-deliver on restart; the processor's
/// read-before-process rule makes that harmless.
pub struct JobQueue {
    keyspace: Keyspace,
    pending: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
    in_flight: Mutex<HashSet<u64>>,
}

impl JobQueue {
    /// Open or create a queue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening job queue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let pending = keyspace.open_partition("pending", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(b"next_seq")?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!("Job queue opened, current sequence: {}", current_seq);

        Ok(Self {
            keyspace,
            pending,
            metadata,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Publish a message and return its sequence number
    ///
    /// The message is persisted before the counter, so a crash between the
    /// two writes re-uses the sequence rather than losing the message.
    pub fn publish(&self, message: &JobMessage) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let value = serde_json::to_vec(message)?;
        let key = seq.to_be_bytes();
        self.pending.insert(key, value)?;

        let next_seq = seq + 1;
        self.metadata.insert(b"next_seq", next_seq.to_be_bytes())?;

        debug!(seq, job_id = %message.job_id, "Message published");

        Ok(seq)
    }

    /// Pull up to `max` undelivered messages, oldest first. Pulled
    /// messages are marked in-flight and will not be returned again until
    /// they are nacked (or the process restarts).
    pub fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        let mut deliveries = Vec::new();

        for item in self.pending.iter() {
            if deliveries.len() >= max {
                break;
            }
            let (key, value) = item?;
            let seq = u64::from_be_bytes(key.as_ref().try_into().unwrap_or([0u8; 8]));
            if in_flight.contains(&seq) {
                continue;
            }
            let message: JobMessage = serde_json::from_slice(&value)?;
            in_flight.insert(seq);
            deliveries.push(Delivery { seq, message });
        }

        Ok(deliveries)
    }

    /// Acknowledge: the message is done and removed for good.
    pub fn ack(&self, seq: u64) -> Result<()> {
        self.pending.remove(seq.to_be_bytes())?;
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&seq);
        debug!(seq, "Message acked");
        Ok(())
    }

    /// Negative-acknowledge: return the message to the pollable set for
    /// re-delivery.
    pub fn nack(&self, seq: u64) {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&seq);
        debug!(seq, "Message nacked");
    }

    /// Number of messages awaiting delivery or settlement
    pub fn pending_count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.pending.iter() {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Get current sequence counter value
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify the queue is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}
