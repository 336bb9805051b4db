use std::sync::Arc;

use crate::config::Config;
use crate::ledger::LedgerStore;
use crate::observability::Metrics;
use crate::queue::JobQueue;
use crate::worker::JobProcessor;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LedgerStore>,
    pub processor: Arc<JobProcessor>,
    /// Present only in pull mode; the enqueue endpoint publishes here.
    pub queue: Option<Arc<JobQueue>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<LedgerStore>,
        processor: Arc<JobProcessor>,
        queue: Option<Arc<JobQueue>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            store,
            processor,
            queue,
            metrics,
        }
    }
}
