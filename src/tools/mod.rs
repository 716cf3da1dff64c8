//! Tool services: discovery, invocation and argument handling.
//!
//! The chain runner only sees the [`ToolRuntime`] trait. The HTTP adapter in
//! [`mcp`] is the production implementation.

pub mod mcp;
pub mod redaction;
pub mod schema_validator;

mod runtime;
mod tool;

pub use runtime::{CallContext, McpToolRuntime, SelectedTool, ToolRuntime, normalize_tool_name, select_tool};
pub use tool::{ToolDefinition, ToolResult, validate_tool_schema};
