//! Execution state machine and per-run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifiedError;

/// State of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, no step attempted yet.
    Pending,
    /// Steps are being executed.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step failed and the rest were skipped.
    Failed,
}

impl ExecutionState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ExecutionState) -> bool {
        use ExecutionState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one attempted step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub mcp_name: String,
    pub action: String,
    /// Tool actually invoked, when selection got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_result: Option<String>,
    /// Data handed forward to the next step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    pub duration_ms: u64,
}

impl StepResult {
    /// A failed step.
    pub fn failed(
        step_number: u32,
        mcp_name: impl Into<String>,
        action: impl Into<String>,
        error: ClassifiedError,
    ) -> Self {
        Self {
            step_number,
            mcp_name: mcp_name.into(),
            action: action.into(),
            tool_name: None,
            success: false,
            raw_result: None,
            formatted_result: None,
            parsed_data: None,
            error: Some(error),
            duration_ms: 0,
        }
    }
}

/// Hand-off to the persistence layer once an execution ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub task_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub success: bool,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    pub total_steps: usize,
    pub completed_at: DateTime<Utc>,
}

/// Per-run context, exclusively owned by one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub task_id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    state: ExecutionState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    step_results: Vec<StepResult>,
}

impl ExecutionContext {
    pub fn new(task_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            conversation_id: None,
            state: ExecutionState::Pending,
            started_at: Utc::now(),
            completed_at: None,
            step_results: Vec::new(),
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Most recent successful result, if the last recorded step succeeded.
    pub fn last_success(&self) -> Option<&StepResult> {
        self.step_results.last().filter(|r| r.success)
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, new_state: ExecutionState) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }
        self.state = new_state;
        if new_state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Append a step result. Step numbers must continue the sequence.
    pub fn record(&mut self, result: StepResult) -> Result<(), String> {
        let expected = self.step_results.len() as u32 + 1;
        if result.step_number != expected {
            return Err(format!(
                "Step result out of order: expected {}, got {}",
                expected, result.step_number
            ));
        }
        self.step_results.push(result);
        Ok(())
    }

    /// True iff every planned step was attempted and succeeded.
    pub fn all_succeeded(&self, total_steps: usize) -> bool {
        self.step_results.len() == total_steps && self.step_results.iter().all(|r| r.success)
    }

    /// Build the persistence hand-off.
    pub fn summary(&self, total_steps: usize, final_result: Option<String>) -> ExecutionSummary {
        ExecutionSummary {
            task_id: self.task_id.clone(),
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            success: self.all_succeeded(total_steps),
            steps: self.step_results.clone(),
            final_result,
            total_steps,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ErrorClassifier, ErrorKind};

    fn ok(step: u32) -> StepResult {
        StepResult {
            step_number: step,
            mcp_name: "crypto".to_string(),
            action: "get_price".to_string(),
            tool_name: Some("get_price".to_string()),
            success: true,
            raw_result: Some(serde_json::json!({"price": 65000})),
            formatted_result: Some("price: 65000".to_string()),
            parsed_data: Some(serde_json::json!({"price": 65000})),
            error: None,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_state_transitions() {
        assert!(ExecutionState::Pending.can_transition_to(ExecutionState::Running));
        assert!(ExecutionState::Running.can_transition_to(ExecutionState::Failed));
        assert!(!ExecutionState::Completed.can_transition_to(ExecutionState::Running));
        assert!(!ExecutionState::Failed.can_transition_to(ExecutionState::Completed));
        assert!(ExecutionState::Failed.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
    }

    #[test]
    fn test_context_lifecycle() {
        let mut ctx = ExecutionContext::new("task-1", "alice");
        assert_eq!(ctx.state(), ExecutionState::Pending);

        ctx.transition_to(ExecutionState::Running).unwrap();
        assert!(ctx.completed_at.is_none());
        ctx.transition_to(ExecutionState::Completed).unwrap();
        assert!(ctx.completed_at.is_some());
        assert!(ctx.transition_to(ExecutionState::Running).is_err());
    }

    #[test]
    fn test_record_enforces_contiguous_steps() {
        let mut ctx = ExecutionContext::new("task-1", "alice");
        ctx.record(ok(1)).unwrap();
        assert!(ctx.record(ok(3)).is_err());
        ctx.record(ok(2)).unwrap();
        assert_eq!(ctx.step_results().len(), 2);
    }

    #[test]
    fn test_summary_success_requires_all_steps() {
        let mut ctx = ExecutionContext::new("task-1", "alice").with_conversation("conv-9");
        ctx.record(ok(1)).unwrap();
        assert!(!ctx.summary(2, None).success);

        let error = ErrorClassifier::new().classify("HTTP 500", None, Some("crypto"));
        assert_eq!(error.kind, ErrorKind::ServerError);
        ctx.record(StepResult::failed(2, "crypto", "get_price", error)).unwrap();

        let summary = ctx.summary(2, None);
        assert!(!summary.success);
        assert_eq!(summary.conversation_id.as_deref(), Some("conv-9"));
        assert_eq!(summary.steps.len(), 2);
        assert!(ctx.last_success().is_none());
    }
}
