use std::time::Duration;

use async_trait::async_trait;

use super::ClassifiedError;

/// Optional source of a richer explanation for a classified failure
/// (for example an LLM call in the host application).
#[async_trait]
pub trait ErrorEnricher: Send + Sync {
    async fn explain(
        &self,
        error: &ClassifiedError,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

pub(super) async fn enrich_bounded(
    enricher: &dyn ErrorEnricher,
    mut error: ClassifiedError,
    timeout: Duration,
) -> ClassifiedError {
    match tokio::time::timeout(timeout, enricher.explain(&error)).await {
        Ok(Ok(details)) if !details.trim().is_empty() => {
            error.details = Some(details);
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::debug!(kind = %error.kind, "Error enrichment failed: {}", e);
        }
        Err(_) => {
            tracing::debug!(kind = %error.kind, ?timeout, "Error enrichment timed out");
        }
    }
    error
}
