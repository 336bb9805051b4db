//! Periodic maintenance: stuck-job recovery, completed-job retention,
//! heartbeat
//!
//! Every sweep only touches rows whose state and timestamps show they are
//! abandoned, so running concurrently with active processing is safe, and
//! a second back-to-back run is always a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::ledger::LedgerStore;
use crate::observability::Metrics;

/// Fixed cadence and threshold for the extra sweeper that guards the pull
/// source against worker crashes mid-processing.
const PULL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const PULL_SWEEP_THRESHOLD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    pub stuck_threshold: Duration,
    pub keep_completed_per_stock: usize,
}

/// One sweep: reset stuck jobs, then trim completed-job history.
pub fn sweep(store: &LedgerStore, settings: &MaintenanceSettings, metrics: &Metrics) {
    match store.reset_stuck_jobs(settings.stuck_threshold) {
        Ok(count) => {
            if count > 0 {
                info!(count, "Reset stuck jobs");
            }
            metrics.stuck_jobs_reset(count as u64);
        }
        Err(e) => error!(error = %e, "Stuck-job reset failed"),
    }

    match store.cleanup_old_completed(settings.keep_completed_per_stock) {
        Ok(count) => {
            if count > 0 {
                info!(count, "Cleaned up old completed jobs");
            }
            metrics.jobs_cleaned(count as u64);
        }
        Err(e) => error!(error = %e, "Completed-job cleanup failed"),
    }
}

/// Startup cleanup: one sweep before any delivery source starts.
pub fn run_startup_cleanup(
    store: &LedgerStore,
    settings: &MaintenanceSettings,
    metrics: &Metrics,
) {
    info!("Running startup cleanup");
    sweep(store, settings, metrics);
}

/// Cleanup loop: sweep every `interval` until shutdown.
pub async fn run_cleanup_loop(
    store: Arc<LedgerStore>,
    settings: MaintenanceSettings,
    interval: Duration,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // interval fires immediately; the startup cleanup already covered that
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => sweep(&store, &settings, &metrics),
        }
    }

    info!("Cleanup loop stopped");
}

/// Heartbeat loop: a debug log line proving the worker is alive. No side
/// effects.
pub async fn run_heartbeat(interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => debug!("Enrichment processor alive"),
        }
    }
}

/// Extra stuck-job sweeper for pull mode, on a fixed five-minute cadence
/// with the fixed five-minute threshold.
pub async fn run_pull_sweeper(
    store: Arc<LedgerStore>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(PULL_SWEEP_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match store.reset_stuck_jobs(PULL_SWEEP_THRESHOLD) {
                    Ok(count) => {
                        if count > 0 {
                            info!(count, "Pull sweeper reset stuck jobs");
                        }
                        metrics.stuck_jobs_reset(count as u64);
                    }
                    Err(e) => error!(error = %e, "Pull sweeper failed"),
                }
            }
        }
    }
}
