//! Per-execution state.

mod state;

pub use state::{ExecutionContext, ExecutionState, ExecutionSummary, StepResult};
