use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::context::ExecutionSummary;

/// Receives the execution summary once a run ends.
///
/// Failures are logged by the runner and never change the outcome.
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn persist(
        &self,
        summary: &ExecutionSummary,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Keeps summaries in memory.
#[derive(Debug, Default)]
pub struct InMemorySummarySink {
    summaries: Mutex<Vec<ExecutionSummary>>,
}

impl InMemorySummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> Vec<ExecutionSummary> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SummarySink for InMemorySummarySink {
    async fn persist(
        &self,
        summary: &ExecutionSummary,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(summary.clone());
        Ok(())
    }
}
