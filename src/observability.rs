//! Process-local counters for the worker loops
//!
//! Kept deliberately small: the job record is the user-facing signal, so
//! these counters exist for logs and tests rather than an external
//! metrics surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_started: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    phases_degraded: AtomicU64,
    stuck_jobs_reset: AtomicU64,
    jobs_cleaned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn phase_degraded(&self) {
        self.phases_degraded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "phases_degraded", "Metric incremented");
    }

    pub fn stuck_jobs_reset(&self, count: u64) {
        self.stuck_jobs_reset.fetch_add(count, Ordering::Relaxed);
    }

    pub fn jobs_cleaned(&self, count: u64) {
        self.jobs_cleaned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            phases_degraded: self.phases_degraded.load(Ordering::Relaxed),
            stuck_jobs_reset: self.stuck_jobs_reset.load(Ordering::Relaxed),
            jobs_cleaned: self.jobs_cleaned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub phases_degraded: u64,
    pub stuck_jobs_reset: u64,
    pub jobs_cleaned: u64,
}
