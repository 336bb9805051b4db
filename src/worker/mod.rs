//! Enrichment worker
//!
//! The processor executes one job end-to-end; the pipeline runs the five
//! enrichment phases; the source loops feed jobs in from the queue or the
//! ledger; maintenance keeps the job table healthy.

pub mod maintenance;
pub mod pipeline;
pub mod processor;
pub mod sources;

pub use maintenance::MaintenanceSettings;
pub use pipeline::{EnrichmentOutcome, LogoPipeline, Pipeline, PipelineError};
pub use processor::{Disposition, IngressDecision, JobProcessor, ProcessError};
