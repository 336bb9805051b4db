/// Fjall-based persistence layer for enrichment jobs and artifacts
///
/// This module is the single synchronisation point between delivery
/// sources. It uses Fjall (an embedded LSM key-value store) to persist:
///
/// - Enrichment jobs (the per-stock work state machine)
/// - Pending enrichments (reviewable artifacts produced by successful jobs)
/// - Stock-details snapshots (read-only input, maintained by a collaborator)
/// - Metadata (sweep bookkeeping)
///
/// ## Maintenance
///
/// Stuck-job recovery and completed-job retention live in
/// [`maintenance`] and are driven by the periodic cleanup loop; see
/// `worker::maintenance`.
///
/// ## Usage
///
/// ```rust,ignore
/// use enrichd::ledger::LedgerStore;
///
/// let store = LedgerStore::open("data/ledger")?;
/// let job = store.get_job("job_123")?;
/// ```
pub mod error;
pub mod maintenance;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::{LedgerStore, StoreStats};
