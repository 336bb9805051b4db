//! Process assembly and supervision
//!
//! Wires the ledger, collaborators, pipeline and processor together, then
//! runs the delivery sources and maintenance loops under one shutdown
//! signal. Dependencies are constructed here and injected; nothing below
//! this layer reaches for globals.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::api::{self, state::AppState};
use crate::clients::scraper::ScraperConfig;
use crate::clients::{HttpLogoDiscoverer, HttpScraper, SvgCliTransformer, select_enricher};
use crate::config::{Config, LogoStorageProvider};
use crate::ledger::LedgerStore;
use crate::model::JobState;
use crate::observability::Metrics;
use crate::queue::{JobQueue, PullSubscriber};
use crate::storage::StorageClient;
use crate::worker::{
    JobProcessor, LogoPipeline, MaintenanceSettings, Pipeline, maintenance, sources,
};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything the delivery sources share.
struct Runtime {
    config: Arc<Config>,
    store: Arc<LedgerStore>,
    processor: Arc<JobProcessor>,
    metrics: Arc<Metrics>,
    settings: MaintenanceSettings,
}

fn build_runtime(config: Config) -> Result<Runtime, AnyError> {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let store = Arc::new(LedgerStore::open(&config.ledger.path)?);

    let api_key = config
        .enrichment
        .api_key
        .clone()
        .ok_or("enrichment API key missing")?;
    let enricher = select_enricher(
        &config.enrichment.model,
        &api_key,
        config.enrichment.base_url.as_deref(),
    )
    .ok_or_else(|| format!("unsupported enrichment model: {}", config.enrichment.model))?;

    let scraper = Arc::new(HttpScraper::new(ScraperConfig {
        request_timeout: config.scraper.request_timeout.as_duration(),
        user_agent: config
            .scraper
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("enrichd/{}", env!("CARGO_PKG_VERSION"))),
    })?);

    let logo = match config.logo.bucket() {
        Some(bucket) => {
            let storage = match config.logo.provider {
                LogoStorageProvider::Gcs => StorageClient::gcs(bucket)?,
                LogoStorageProvider::Memory => StorageClient::in_memory(),
            };
            Some(LogoPipeline {
                discoverer: Arc::new(HttpLogoDiscoverer::new(
                    config.scraper.search_api_key.clone(),
                )?),
                transformer: Arc::new(SvgCliTransformer::new(&config.logo.transformer_bin)),
                storage,
            })
        }
        None => {
            info!("No logo bucket configured; logo phase disabled");
            None
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        enricher,
        scraper.clone(),
        scraper,
        logo,
        config.processing.quality_threshold,
        metrics.clone(),
    ));

    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        pipeline,
        config.processing.job_timeout.as_duration(),
        metrics.clone(),
    ));

    let settings = MaintenanceSettings {
        stuck_threshold: config.processing.stuck_threshold.as_duration(),
        keep_completed_per_stock: config.processing.keep_completed_per_stock,
    };

    Ok(Runtime {
        config,
        store,
        processor,
        metrics,
        settings,
    })
}

/// Run the worker service until SIGTERM / SIGINT. Exits with an error
/// (non-zero) when any supervised loop dies.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let rt = build_runtime(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Startup cleanup runs before any source accepts work
    maintenance::run_startup_cleanup(&rt.store, &rt.settings, &rt.metrics);

    let mut tasks: JoinSet<Result<(), AnyError>> = JoinSet::new();

    let queue = if rt.config.queue.enabled {
        let queue = Arc::new(JobQueue::open(&rt.config.queue.path)?);

        let (subscriber, receivers) = PullSubscriber::new(
            queue.clone(),
            rt.config.queue.workers,
            rt.config.queue.channel_size,
            rt.config.queue.receive_interval.as_duration(),
        );

        for (worker_id, receiver) in receivers.into_iter().enumerate() {
            let queue = queue.clone();
            let processor = rt.processor.clone();
            let shutdown = shutdown_rx.clone();
            tasks.spawn(async move {
                sources::run_delivery_worker(worker_id, receiver, queue, processor, shutdown)
                    .await;
                Ok(())
            });
        }

        let subscriber_shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            subscriber.run(subscriber_shutdown).await?;
            Ok(())
        });

        // Extra sweeper guarding against worker crashes mid-processing
        let sweeper_store = rt.store.clone();
        let sweeper_metrics = rt.metrics.clone();
        let sweeper_shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            maintenance::run_pull_sweeper(sweeper_store, sweeper_metrics, sweeper_shutdown).await;
            Ok(())
        });

        Some(queue)
    } else {
        info!("Queue disabled; using local ledger polling");
        let processor = rt.processor.clone();
        let poll_interval = rt.config.processing.poll_interval.as_duration();
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            sources::run_poller(processor, poll_interval, shutdown).await;
            Ok(())
        });
        None
    };

    {
        let store = rt.store.clone();
        let settings = rt.settings.clone();
        let interval = rt.config.processing.cleanup_interval.as_duration();
        let metrics = rt.metrics.clone();
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            maintenance::run_cleanup_loop(store, settings, interval, metrics, shutdown).await;
            Ok(())
        });
    }

    {
        let interval = rt.config.processing.heartbeat_interval.as_duration();
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            maintenance::run_heartbeat(interval, shutdown).await;
            Ok(())
        });
    }

    if rt.config.server.enabled {
        let state = AppState::new(
            rt.config.clone(),
            rt.store.clone(),
            rt.processor.clone(),
            queue.clone(),
            rt.metrics.clone(),
        );
        let address = rt.config.server.bind_addr;
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move { api::serve(state, address, shutdown).await });
    }

    // Either a signal arrives, or a supervised loop dies early
    let mut exit_error: Option<AnyError> = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        Some(result) = tasks.join_next() => {
            exit_error = Some(match result {
                Ok(Ok(())) => "supervised loop exited unexpectedly".into(),
                Ok(Err(e)) => e,
                Err(join_err) => Box::new(join_err),
            });
        }
    }

    // Stop accepting new work; in-flight jobs finish under their own
    // deadline inside the loops
    let _ = shutdown_tx.send(true);

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Loop exited with error during shutdown"),
            Err(join_err) => error!(error = %join_err, "Loop panicked during shutdown"),
        }
    }

    if let Some(queue) = &queue {
        if let Err(e) = queue.flush() {
            warn!(error = %e, "Queue flush failed during shutdown");
        }
    }
    rt.store.persist()?;

    match exit_error {
        Some(e) => Err(e),
        None => {
            info!("Shutdown complete");
            Ok(())
        }
    }
}

/// One-shot drain: process every queued job, then exit. Useful for
/// operating without a long-lived worker.
pub async fn drain(config: Config) -> Result<(), AnyError> {
    let rt = build_runtime(config)?;

    maintenance::run_startup_cleanup(&rt.store, &rt.settings, &rt.metrics);

    let (jobs, total) = rt.store.list_jobs(usize::MAX, 0, Some(JobState::Queued))?;
    info!(total, "Draining queued jobs");

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for job in jobs {
        info!(job_id = %job.job_id, stock_code = %job.stock_code, "Processing job");
        match rt.processor.process_job(&job.job_id).await {
            Ok(()) => succeeded += 1,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Job failed");
                failed += 1;
            }
        }
    }

    info!(succeeded, failed, "Drain complete");
    rt.store.persist()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
