use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::model::{
    EnrichmentData, EnrichmentJob, JobState, PendingEnrichment, QualityScore, ReviewState,
    StockDetails,
};

use super::error::Result;
use super::maintenance;
use super::partitions::{encode_job_key, encode_pending_key, encode_stock_key};

/// Fjall-backed persistent storage for enrichment jobs, pending-enrichment
/// artifacts, and the read-only stock-details snapshot.
///
/// Every mutation is a single-key write. Job transitions are serialized by
/// an internal lock so that read-modify-write sequences (claims, sweeps)
/// cannot interleave within the process; the store is the only
/// synchronisation point between delivery sources.
#[derive(Clone)]
pub struct LedgerStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    stocks: PartitionHandle,
    pending: PartitionHandle,
    metadata: PartitionHandle,
    transition_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let stocks = keyspace.open_partition("stocks", PartitionCreateOptions::default())?;
        let pending = keyspace.open_partition("pending", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Ledger opened successfully");
        Ok(Self {
            keyspace,
            jobs,
            stocks,
            pending,
            metadata,
            transition_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: &str) -> Result<Option<EnrichmentJob>> {
        let key = encode_job_key(job_id);
        match self.jobs.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Store a job record. Used by the enqueue endpoint (and by the
    /// collaborator that creates jobs out-of-band).
    pub fn insert_job(&self, job: &EnrichmentJob) -> Result<()> {
        let key = encode_job_key(&job.job_id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.job_id, stock_code = %job.stock_code, "Job inserted");
        Ok(())
    }

    /// Unconditional single-row status transition. Overwrites
    /// `enrichment_id` and `error_message` with the supplied values and
    /// bumps `updated_at`. Legality of the transition is the caller's
    /// responsibility.
    pub fn update_job_status(
        &self,
        job_id: &str,
        state: JobState,
        enrichment_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let _guard = self.transition_lock.lock().expect("transition lock poisoned");

        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| super::error::LedgerError::JobNotFound(job_id.to_string()))?;

        job.state = state;
        job.enrichment_id = enrichment_id.map(String::from);
        job.error_message = error_message.map(String::from);
        job.updated_at = Utc::now();

        let key = encode_job_key(job_id);
        self.jobs.insert(key, serde_json::to_vec(&job)?)?;
        debug!(job_id, %state, "Job status updated");
        Ok(())
    }

    /// Compare-and-swap claim: transition `queued -> processing` only if
    /// the job is still `queued`. Returns false when another worker (or a
    /// concurrent drain) got there first, or the job is already terminal.
    pub fn try_claim(&self, job_id: &str) -> Result<bool> {
        let _guard = self.transition_lock.lock().expect("transition lock poisoned");

        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| super::error::LedgerError::JobNotFound(job_id.to_string()))?;

        if job.state != JobState::Queued {
            debug!(job_id, state = %job.state, "Claim refused");
            return Ok(false);
        }

        job.state = JobState::Processing;
        job.updated_at = Utc::now();
        self.jobs
            .insert(encode_job_key(job_id), serde_json::to_vec(&job)?)?;
        debug!(job_id, "Job claimed for processing");
        Ok(true)
    }

    /// List jobs ordered by creation time ascending, optionally filtered
    /// by state. Returns the page and the total matching count.
    pub fn list_jobs(
        &self,
        limit: usize,
        offset: usize,
        state: Option<JobState>,
    ) -> Result<(Vec<EnrichmentJob>, usize)> {
        let mut matching = Vec::new();

        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: EnrichmentJob = serde_json::from_slice(&value)?;
            if state.is_none_or(|s| job.state == s) {
                matching.push(job);
            }
        }

        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });

        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    /// Transition every job stuck in `processing` past the threshold back
    /// to `queued`. Returns how many rows changed.
    pub fn reset_stuck_jobs(&self, threshold: Duration) -> Result<usize> {
        let _guard = self.transition_lock.lock().expect("transition lock poisoned");
        maintenance::reset_stuck_jobs(&self.jobs, threshold)
    }

    /// For each stock code, retain the most recent `keep_per_stock`
    /// completed jobs and delete the older ones. `failed` and `cancelled`
    /// jobs are not touched. Returns the number deleted.
    pub fn cleanup_old_completed(&self, keep_per_stock: usize) -> Result<usize> {
        let _guard = self.transition_lock.lock().expect("transition lock poisoned");
        maintenance::cleanup_old_completed(&self.jobs, keep_per_stock)
    }

    /// Get the read-only stock snapshot
    pub fn get_stock_details(&self, stock_code: &str) -> Result<Option<StockDetails>> {
        let key = encode_stock_key(stock_code);
        match self.stocks.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Write a stock snapshot. The worker never calls this during
    /// processing; it exists for the collaborator that maintains the
    /// snapshot and for tests.
    pub fn put_stock_details(&self, details: &StockDetails) -> Result<()> {
        let key = encode_stock_key(&details.stock_code);
        self.stocks.insert(key, serde_json::to_vec(details)?)?;
        Ok(())
    }

    /// Create a pending-enrichment artifact. Idempotent on `candidate_id`:
    /// if an artifact with that id already exists it is left untouched and
    /// its id returned. Returns the id actually assigned.
    pub fn save_pending_enrichment(
        &self,
        candidate_id: &str,
        stock_code: &str,
        payload: EnrichmentData,
        quality: QualityScore,
    ) -> Result<String> {
        let key = encode_pending_key(candidate_id);
        if let Some(existing) = self.pending.get(&key)? {
            let artifact: PendingEnrichment = serde_json::from_slice(&existing)?;
            debug!(enrichment_id = %artifact.enrichment_id, "Pending enrichment already exists");
            return Ok(artifact.enrichment_id);
        }

        let artifact = PendingEnrichment {
            enrichment_id: candidate_id.to_string(),
            stock_code: stock_code.to_string(),
            state: ReviewState::PendingReview,
            payload,
            quality,
            created_at: Utc::now(),
        };
        self.pending.insert(key, serde_json::to_vec(&artifact)?)?;
        info!(enrichment_id = candidate_id, stock_code, "Pending enrichment saved");
        Ok(artifact.enrichment_id)
    }

    /// Get a pending-enrichment artifact by ID
    pub fn get_pending_enrichment(&self, enrichment_id: &str) -> Result<Option<PendingEnrichment>> {
        let key = encode_pending_key(enrichment_id);
        match self.pending.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let mut job_count = 0;
        let mut pending_count = 0;
        let mut stock_count = 0;

        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }

        for item in self.pending.iter() {
            item?;
            pending_count += 1;
        }

        for item in self.stocks.iter() {
            item?;
            stock_count += 1;
        }

        Ok(StoreStats {
            job_count,
            pending_count,
            stock_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub job_count: usize,
    pub pending_count: usize,
    pub stock_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LedgerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    fn seed_job(store: &LedgerStore, job_id: &str, stock_code: &str) -> EnrichmentJob {
        let job = EnrichmentJob::new(job_id, stock_code, false);
        store.insert_job(&job).unwrap();
        job
    }

    #[test]
    fn test_open_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("test_ledger"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_insert_and_get_job() {
        let (store, _temp) = create_test_store();
        seed_job(&store, "job_123", "DMP");

        let retrieved = store.get_job("job_123").unwrap().unwrap();
        assert_eq!(retrieved.job_id, "job_123");
        assert_eq!(retrieved.stock_code, "DMP");
        assert_eq!(retrieved.state, JobState::Queued);
    }

    #[test]
    fn test_get_nonexistent_job() {
        let (store, _temp) = create_test_store();
        assert!(store.get_job("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_update_job_status() {
        let (store, _temp) = create_test_store();
        let job = seed_job(&store, "j1", "DMP");

        store
            .update_job_status("j1", JobState::Failed, None, Some("scrape exploded"))
            .unwrap();

        let updated = store.get_job("j1").unwrap().unwrap();
        assert_eq!(updated.state, JobState::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("scrape exploded"));
        assert!(updated.updated_at >= job.updated_at);
    }

    #[test]
    fn test_update_unknown_job_errors() {
        let (store, _temp) = create_test_store();
        let err = store
            .update_job_status("ghost", JobState::Failed, None, None)
            .unwrap_err();
        assert!(matches!(err, super::super::error::LedgerError::JobNotFound(_)));
    }

    #[test]
    fn test_try_claim_only_from_queued() {
        let (store, _temp) = create_test_store();
        seed_job(&store, "j1", "DMP");

        assert!(store.try_claim("j1").unwrap());
        let claimed = store.get_job("j1").unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Processing);

        // Second claim loses the race
        assert!(!store.try_claim("j1").unwrap());

        store
            .update_job_status("j1", JobState::Completed, Some("e1"), None)
            .unwrap();
        assert!(!store.try_claim("j1").unwrap());
    }

    #[test]
    fn test_list_jobs_filters_and_orders() {
        let (store, _temp) = create_test_store();
        for i in 0..5 {
            seed_job(&store, &format!("j{}", i), "DMP");
        }
        store
            .update_job_status("j2", JobState::Completed, Some("e1"), None)
            .unwrap();

        let (queued, total) = store.list_jobs(10, 0, Some(JobState::Queued)).unwrap();
        assert_eq!(total, 4);
        assert_eq!(queued.len(), 4);
        // Creation order preserved
        assert_eq!(queued[0].job_id, "j0");

        let (page, total) = store.list_jobs(2, 1, None).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].job_id, "j1");
    }

    #[test]
    fn test_save_pending_enrichment_is_idempotent() {
        let (store, _temp) = create_test_store();

        let id = store
            .save_pending_enrichment(
                "cand-1",
                "DMP",
                EnrichmentData::default(),
                QualityScore::default(),
            )
            .unwrap();
        assert_eq!(id, "cand-1");

        let again = store
            .save_pending_enrichment(
                "cand-1",
                "DMP",
                EnrichmentData::default(),
                QualityScore {
                    overall_score: 0.9,
                    warnings: vec![],
                },
            )
            .unwrap();
        assert_eq!(again, "cand-1");

        // First write wins; the artifact is never mutated
        let artifact = store.get_pending_enrichment("cand-1").unwrap().unwrap();
        assert_eq!(artifact.quality.overall_score, 0.0);
        assert_eq!(artifact.state, ReviewState::PendingReview);
    }

    #[test]
    fn test_stock_details_round_trip() {
        let (store, _temp) = create_test_store();
        let details = StockDetails {
            stock_code: "DMP".to_string(),
            company_name: "Domino Mining".to_string(),
            industry: Some("Materials".to_string()),
            website: Some("https://example.com".to_string()),
            summary: None,
            enrichment_status: "pending".to_string(),
        };
        store.put_stock_details(&details).unwrap();

        let read = store.get_stock_details("DMP").unwrap().unwrap();
        assert_eq!(read.company_name, "Domino Mining");
        assert!(!read.is_enriched());
        assert!(store.get_stock_details("XYZ").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (store, _temp) = create_test_store();
        seed_job(&store, "j1", "DMP");
        store
            .save_pending_enrichment(
                "e1",
                "DMP",
                EnrichmentData::default(),
                QualityScore::default(),
            )
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.job_count, 1);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.stock_count, 0);
    }

    #[test]
    fn test_persist() {
        let (store, _temp) = create_test_store();
        seed_job(&store, "job_persist", "DMP");
        store.persist().unwrap();
    }
}
