//! Progress events pushed to the live consumer of an execution.
//!
//! Events serialize as `{"event": "<tag>", "data": {...}}`. Framing (SSE,
//! WebSocket) is the consumer's business.

mod sink;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifiedError;

pub use sink::{CallbackSink, EventSink, NullSink, ProgressStreamer};

/// One progress event. Emitted in strict order within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    ExecutionStart {
        task_id: String,
        user_id: String,
        total_steps: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    StatusUpdate {
        step: u32,
        total_steps: usize,
        message: String,
    },
    StepStart {
        step: u32,
        mcp_name: String,
        action: String,
        input: serde_json::Value,
    },
    StepExecuting {
        step: u32,
        mcp_name: String,
        tool_name: String,
    },
    StepRawResult {
        step: u32,
        tool_name: String,
        result: serde_json::Value,
    },
    StepResultChunk {
        step: u32,
        index: usize,
        chunk: String,
        is_last: bool,
    },
    StepComplete {
        step: u32,
        mcp_name: String,
        tool_name: String,
        result: String,
        duration_ms: u64,
    },
    StepError {
        step: u32,
        mcp_name: String,
        error: ClassifiedError,
    },
    FinalResultChunk {
        index: usize,
        chunk: String,
        is_last: bool,
    },
    WorkflowComplete {
        success: bool,
        completed_steps: usize,
        total_steps: usize,
    },
    TaskComplete {
        task_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_result: Option<String>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ClassifiedError>,
    },
}

impl ProgressEvent {
    /// The wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExecutionStart { .. } => "execution_start",
            Self::StatusUpdate { .. } => "status_update",
            Self::StepStart { .. } => "step_start",
            Self::StepExecuting { .. } => "step_executing",
            Self::StepRawResult { .. } => "step_raw_result",
            Self::StepResultChunk { .. } => "step_result_chunk",
            Self::StepComplete { .. } => "step_complete",
            Self::StepError { .. } => "step_error",
            Self::FinalResultChunk { .. } => "final_result_chunk",
            Self::WorkflowComplete { .. } => "workflow_complete",
            Self::TaskComplete { .. } => "task_complete",
            Self::Error { .. } => "error",
        }
    }
}
