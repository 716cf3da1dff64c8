//! Human-readable rendering of step results.

use serde_json::Value;

use crate::workflow::WorkflowStep;

/// Formatting failed; the runner falls back to compact JSON.
#[derive(Debug, thiserror::Error)]
#[error("Formatting failed: {0}")]
pub struct FormatError(pub String);

/// Turns a step's result into text for the user.
pub trait ResultFormatter: Send + Sync {
    fn format(&self, step: &WorkflowStep, result: &Value) -> Result<String, FormatError>;

    /// Streamed chunk size in characters. `None` disables chunk events.
    fn chunk_size(&self) -> Option<usize> {
        None
    }
}

/// Deterministic JSON-to-text rendering.
///
/// Strings render verbatim, objects as `key: value` lines, arrays as
/// `- item` lines. Nesting indents by two spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFormatter;

impl PlainFormatter {
    fn render(value: &Value, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        match value {
            Value::Object(map) if map.is_empty() => out.push_str(&format!("{pad}{{}}\n")),
            Value::Array(items) if items.is_empty() => out.push_str(&format!("{pad}[]\n")),
            Value::Object(map) => {
                for (key, value) in map {
                    if is_scalar(value) {
                        out.push_str(&format!("{pad}{key}: {}\n", scalar(value)));
                    } else {
                        out.push_str(&format!("{pad}{key}:\n"));
                        Self::render(value, indent + 1, out);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    if is_scalar(item) {
                        out.push_str(&format!("{pad}- {}\n", scalar(item)));
                    } else {
                        out.push_str(&format!("{pad}-\n"));
                        Self::render(item, indent + 1, out);
                    }
                }
            }
            other => out.push_str(&format!("{pad}{}\n", scalar(other))),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(m) if !m.is_empty()) && !matches!(value, Value::Array(a) if !a.is_empty())
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Object(_) => "{}".to_string(),
        Value::Array(_) => "[]".to_string(),
        other => other.to_string(),
    }
}

impl ResultFormatter for PlainFormatter {
    fn format(&self, _step: &WorkflowStep, result: &Value) -> Result<String, FormatError> {
        match result {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok("(no result)".to_string()),
            other => {
                let mut out = String::new();
                Self::render(other, 0, &mut out);
                Ok(out.trim_end().to_string())
            }
        }
    }
}

/// Wraps another formatter and enables chunked streaming.
pub struct ChunkedFormatter<F> {
    inner: F,
    chunk_size: usize,
}

impl<F: ResultFormatter> ChunkedFormatter<F> {
    pub fn new(inner: F, chunk_size: usize) -> Self {
        Self { inner, chunk_size }
    }
}

impl<F: ResultFormatter> ResultFormatter for ChunkedFormatter<F> {
    fn format(&self, step: &WorkflowStep, result: &Value) -> Result<String, FormatError> {
        self.inner.format(step, result)
    }

    fn chunk_size(&self) -> Option<usize> {
        (self.chunk_size > 0).then_some(self.chunk_size)
    }
}
