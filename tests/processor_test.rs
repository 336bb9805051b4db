//! End-to-end processor scenarios against the real embedded store
//!
//! External collaborators are faked; the store, claim logic, panic guard,
//! deadline, and artifact save all run for real.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use enrichd::model::{JobMessage, JobState};
use enrichd::worker::Disposition;

fn queued_message(job_id: &str) -> JobMessage {
    JobMessage {
        job_id: job_id.to_string(),
        stock_code: "DMP".to_string(),
        force: false,
    }
}

#[tokio::test]
async fn happy_path_produces_pending_enrichment() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j1", "DMP", false);

    harness.processor.process_job("j1").await.unwrap();

    let job = harness.store.get_job("j1").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    let enrichment_id = job.enrichment_id.expect("completed job links its artifact");
    assert!(job.error_message.is_none());

    let artifact = harness
        .store
        .get_pending_enrichment(&enrichment_id)
        .unwrap()
        .expect("artifact exists");
    assert_eq!(artifact.stock_code, "DMP");
    assert_eq!(artifact.quality.overall_score, 0.85);
    assert!(artifact.quality.warnings.is_empty());
    // Provider fields pass through verbatim
    assert_eq!(artifact.payload.fields["description"], "Pizza delivery franchise");

    // The pipeline handed the enricher both degradable inputs
    assert_eq!(*enricher.saw_metadata.lock().unwrap(), Some(true));
    assert_eq!(*enricher.saw_report_count.lock().unwrap(), Some(1));
}

#[tokio::test]
async fn already_enriched_without_force_fails_before_pipeline() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).build();

    seed_stock(&harness.store, "DMP", "completed");
    seed_queued_job(&harness.store, "j2", "DMP", false);

    let err = harness.processor.process_job("j2").await.unwrap_err();
    assert!(err.to_string().contains("already enriched"));

    let job = harness.store.get_job("j2").unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.unwrap().contains("already enriched"));

    // The phase runner never ran and no artifact was created
    assert_eq!(enricher.enrich_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.store.stats().unwrap().pending_count, 0);
}

#[tokio::test]
async fn already_enriched_with_force_reenriches() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher).build();

    seed_stock(&harness.store, "DMP", "completed");
    seed_queued_job(&harness.store, "j3", "DMP", true);

    harness.processor.process_job("j3").await.unwrap();

    let job = harness.store.get_job("j3").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(harness.store.stats().unwrap().pending_count, 1);
}

#[tokio::test]
async fn scraper_failure_degrades_to_null_metadata() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).scraper_fails().build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j4", "DMP", false);

    harness.processor.process_job("j4").await.unwrap();

    let job = harness.store.get_job("j4").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    // The enricher ran with no metadata
    assert_eq!(*enricher.saw_metadata.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn crawler_failure_degrades_to_empty_reports() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).crawler_fails().build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j4b", "DMP", false);

    harness.processor.process_job("j4b").await.unwrap();

    assert_eq!(
        harness.store.get_job("j4b").unwrap().unwrap().state,
        JobState::Completed
    );
    assert_eq!(*enricher.saw_report_count.lock().unwrap(), Some(0));
}

#[tokio::test]
async fn llm_failure_is_fatal() {
    let enricher = Arc::new(FakeEnricher::failing());
    let harness = HarnessBuilder::new(enricher).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j5", "DMP", false);

    let err = harness.processor.process_job("j5").await.unwrap_err();
    assert!(err.to_string().contains("gpt enrichment failed"));

    let job = harness.store.get_job("j5").unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.unwrap().contains("gpt enrichment failed"));
    assert_eq!(harness.store.stats().unwrap().pending_count, 0);
}

#[tokio::test]
async fn low_quality_succeeds_with_threshold_warning() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.5));
    let harness = HarnessBuilder::new(enricher).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j6", "DMP", false);

    harness.processor.process_job("j6").await.unwrap();

    let job = harness.store.get_job("j6").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);

    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(
        artifact
            .quality
            .warnings
            .contains(&"overall_score 0.50 is below threshold 0.70".to_string()),
        "warnings were: {:?}",
        artifact.quality.warnings
    );
}

#[tokio::test]
async fn zero_quality_score_gets_no_threshold_warning() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.0));
    let harness = HarnessBuilder::new(enricher).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j7", "DMP", false);

    harness.processor.process_job("j7").await.unwrap();

    let job = harness.store.get_job("j7").unwrap().unwrap();
    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(artifact.quality.warnings.is_empty());
}

#[tokio::test]
async fn quality_evaluation_failure_degrades_to_warning() {
    let mut enricher = FakeEnricher::succeeding(0.85);
    enricher.fail_quality = true;
    let harness = HarnessBuilder::new(Arc::new(enricher)).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j8", "DMP", false);

    harness.processor.process_job("j8").await.unwrap();

    let job = harness.store.get_job("j8").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);

    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(artifact.quality.overall_score, 0.0);
    assert_eq!(artifact.quality.warnings.len(), 1);
    assert!(artifact.quality.warnings[0].contains("quality evaluation failed"));
}

#[tokio::test]
async fn panic_in_phase_becomes_failed_job() {
    let harness = HarnessBuilder::new(Arc::new(PanickingEnricher)).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j9", "DMP", false);

    let err = harness.processor.process_job("j9").await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("panic during processing"));
    assert!(message.contains("enricher exploded"));

    let job = harness.store.get_job("j9").unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(
        job.error_message
            .unwrap()
            .starts_with("panic during processing")
    );
}

#[tokio::test]
async fn deadline_breach_fails_with_timeout_message() {
    let harness = HarnessBuilder::new(Arc::new(SlowEnricher))
        .job_timeout(Duration::from_millis(50))
        .build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j10", "DMP", false);

    let err = harness.processor.process_job("j10").await.unwrap_err();
    assert!(err.to_string().contains("timed out"));

    let job = harness.store.get_job("j10").unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn logo_icon_falls_back_to_vector_url() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    // The tool produced vectors only: no raster main, no raster icon
    let (logo, _storage) = fake_logo_pipeline(Some(true), vec!["logo.svg", "logo_icon.svg"]);
    let harness = HarnessBuilder::new(enricher).with_logo(logo).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j11", "DMP", false);

    harness.processor.process_job("j11").await.unwrap();

    let job = harness.store.get_job("j11").unwrap().unwrap();
    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(
        artifact.payload.logo_icon_url.as_deref(),
        Some("memory://enrichd-local/logos/DMP_icon.svg")
    );
    assert_eq!(
        artifact.payload.logo_url.as_deref(),
        Some("memory://enrichd-local/logos/DMP.svg")
    );
}

#[tokio::test]
async fn logo_uploads_are_deterministic_and_stamped() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let (logo, storage) = fake_logo_pipeline(
        Some(false),
        vec!["logo.png", "logo.svg", "logo_icon.png", "logo_icon.svg"],
    );
    let harness = HarnessBuilder::new(enricher).with_logo(logo).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j12", "DMP", false);

    harness.processor.process_job("j12").await.unwrap();

    for object in [
        "logos/DMP.png",
        "logos/DMP.svg",
        "logos/DMP_icon.png",
        "logos/DMP_icon.svg",
    ] {
        assert!(storage.exists(object).await.unwrap(), "missing {object}");
    }

    let job = harness.store.get_job("j12").unwrap().unwrap();
    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(
        artifact.payload.logo_url.as_deref(),
        Some("memory://enrichd-local/logos/DMP.png")
    );
    assert_eq!(
        artifact.payload.logo_icon_url.as_deref(),
        Some("memory://enrichd-local/logos/DMP_icon.png")
    );
}

#[tokio::test]
async fn no_discovered_logo_leaves_fields_unset() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let (logo, _storage) = fake_logo_pipeline(None, vec![]);
    let harness = HarnessBuilder::new(enricher).with_logo(logo).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "j13", "DMP", false);

    harness.processor.process_job("j13").await.unwrap();

    let job = harness.store.get_job("j13").unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);

    let artifact = harness
        .store
        .get_pending_enrichment(&job.enrichment_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(artifact.payload.logo_url.is_none());
    assert!(artifact.payload.logo_icon_url.is_none());
}

#[tokio::test]
async fn redelivery_for_terminal_job_acks_without_work() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "r1", "DMP", false);

    harness.processor.process_job("r1").await.unwrap();
    let calls_after_first = enricher.enrich_calls.load(Ordering::SeqCst);

    let disposition = harness.processor.handle_message(&queued_message("r1")).await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(enricher.enrich_calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test]
async fn redelivery_for_in_flight_job_acks_without_work() {
    let enricher = Arc::new(FakeEnricher::succeeding(0.85));
    let harness = HarnessBuilder::new(enricher.clone()).build();

    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "r2", "DMP", false);
    // Another worker holds the claim
    assert!(harness.store.try_claim("r2").unwrap());

    let disposition = harness.processor.handle_message(&queued_message("r2")).await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(enricher.enrich_calls.load(Ordering::SeqCst), 0);
    // Still processing: de-duplicated, not failed
    assert_eq!(
        harness.store.get_job("r2").unwrap().unwrap().state,
        JobState::Processing
    );
}

#[tokio::test]
async fn permanent_failure_acks_transient_failure_nacks() {
    // Transient: LLM down
    let harness = HarnessBuilder::new(Arc::new(FakeEnricher::failing())).build();
    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "r3", "DMP", false);
    assert_eq!(
        harness.processor.handle_message(&queued_message("r3")).await,
        Disposition::Nack
    );

    // Permanent: already enriched without force
    let harness = HarnessBuilder::new(Arc::new(FakeEnricher::succeeding(0.85))).build();
    seed_stock(&harness.store, "DMP", "completed");
    seed_queued_job(&harness.store, "r4", "DMP", false);
    assert_eq!(
        harness.processor.handle_message(&queued_message("r4")).await,
        Disposition::Ack
    );
}

#[tokio::test]
async fn message_for_unknown_job_is_acked() {
    let harness = HarnessBuilder::new(Arc::new(FakeEnricher::succeeding(0.85))).build();
    assert_eq!(
        harness
            .processor
            .handle_message(&queued_message("ghost"))
            .await,
        Disposition::Ack
    );
}

#[tokio::test]
async fn missing_stock_details_fails_the_job() {
    let harness = HarnessBuilder::new(Arc::new(FakeEnricher::succeeding(0.85))).build();
    seed_queued_job(&harness.store, "r5", "XYZ", false);

    let err = harness.processor.process_job("r5").await.unwrap_err();
    assert!(err.to_string().contains("stock details not found"));

    let job = harness.store.get_job("r5").unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.is_some());
}

#[tokio::test]
async fn completed_jobs_never_transition_again() {
    let harness = HarnessBuilder::new(Arc::new(FakeEnricher::succeeding(0.85))).build();
    seed_stock(&harness.store, "DMP", "pending");
    seed_queued_job(&harness.store, "r6", "DMP", false);

    harness.processor.process_job("r6").await.unwrap();
    let first = harness.store.get_job("r6").unwrap().unwrap();
    assert_eq!(first.state, JobState::Completed);

    // A second direct call cannot claim a terminal job
    let err = harness.processor.process_job("r6").await.unwrap_err();
    assert!(err.to_string().contains("already claimed"));

    let second = harness.store.get_job("r6").unwrap().unwrap();
    assert_eq!(second.state, JobState::Completed);
    assert_eq!(second.enrichment_id, first.enrichment_id);
    assert_eq!(harness.store.stats().unwrap().pending_count, 1);
}
