use thiserror::Error;

use super::models::Config;

/// Model-name prefixes the enrichment layer knows how to serve.
const SUPPORTED_MODEL_PREFIXES: &[&str] = &["gpt", "gemini"];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported enrichment model: {model} (supported: gpt-*, gemini-*)")]
    UnsupportedModel { model: String },

    #[error("no API key configured for model {model} (set ENRICHMENT_API_KEY)")]
    MissingApiKey { model: String },

    #[error("quality threshold {0} is outside [0.0, 1.0]")]
    QualityThresholdOutOfRange(f64),

    #[error("queue.workers must be at least 1")]
    NoWorkers,

    #[error("processing.job_timeout must be greater than zero")]
    ZeroJobTimeout,
}

/// Validate a loaded configuration. Any error here is fatal at startup.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    let model = &config.enrichment.model;
    if !SUPPORTED_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
    {
        return Err(ValidationError::UnsupportedModel {
            model: model.clone(),
        });
    }

    if config
        .enrichment
        .api_key
        .as_deref()
        .is_none_or(|k| k.is_empty())
    {
        return Err(ValidationError::MissingApiKey {
            model: model.clone(),
        });
    }

    let threshold = config.processing.quality_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ValidationError::QualityThresholdOutOfRange(threshold));
    }

    if config.queue.enabled && config.queue.workers == 0 {
        return Err(ValidationError::NoWorkers);
    }

    if config.processing.job_timeout.as_secs() == 0 {
        return Err(ValidationError::ZeroJobTimeout);
    }

    Ok(())
}
