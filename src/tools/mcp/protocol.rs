//! Wire format of tool services.
//!
//! Discovery: `GET {base}/tools` returns `{"tools": [{name, description, inputSchema}]}`.
//! Invocation: `POST {base}/tools/call` with `{"name", "arguments"}`. Services
//! either answer with a plain JSON payload or with an MCP content envelope
//! `{"content": [{"type": "text", "text": ...}], "isError": bool}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;
use crate::tools::tool::ToolDefinition;

/// Discovery response body.
#[derive(Debug, Deserialize)]
pub(crate) struct ToolListResponse {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// Invocation request body.
#[derive(Debug, Serialize)]
pub(crate) struct ToolCallRequest<'a> {
    pub name: &'a str,
    pub arguments: &'a Value,
}

/// Pull a human-readable message out of an error response body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidate = value
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .or_else(|| value.get("message"))
            .or_else(|| value.get("detail"));
        match candidate {
            Some(Value::String(s)) => return s.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        crate::util::truncate(trimmed, 500)
    }
}

fn is_content_envelope(body: &Value) -> bool {
    let Some(items) = body.get("content").and_then(Value::as_array) else {
        return false;
    };
    body.get("isError").is_some()
        || items
            .iter()
            .any(|item| item.get("type").and_then(Value::as_str).is_some())
}

fn content_item_value(item: &Value) -> Value {
    match item.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = item.get("text").and_then(Value::as_str).unwrap_or_default();
            // Text that holds JSON is returned structured.
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        Some("json") => item.get("json").cloned().unwrap_or(Value::Null),
        Some("resource") => item.get("resource").cloned().unwrap_or(Value::Null),
        _ => item.clone(),
    }
}

/// Unwrap a call response into the tool's payload.
///
/// `isError: true` becomes [`McpError::ToolFailed`]. Plain bodies pass through.
pub(crate) fn unwrap_call_response(tool: &str, body: Value) -> Result<Value, McpError> {
    if !is_content_envelope(&body) {
        return Ok(body);
    }

    let is_error = body.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let items = body
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if is_error {
        let message = items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(McpError::ToolFailed {
            tool: tool.to_string(),
            message: if message.is_empty() {
                "tool reported an error".to_string()
            } else {
                message
            },
        });
    }

    if let Some(structured) = body.get("structuredContent")
        && !structured.is_null()
    {
        return Ok(structured.clone());
    }

    let mut values: Vec<Value> = items.iter().map(content_item_value).collect();
    Ok(match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_body_passes_through() {
        let body = json!({"price": 64000.5, "symbol": "BTC"});
        assert_eq!(unwrap_call_response("get_price", body.clone()).unwrap(), body);
    }

    #[test]
    fn test_text_content_with_json_is_parsed() {
        let body = json!({
            "content": [{"type": "text", "text": "{\"items\": [1, 2]}"}],
            "isError": false
        });
        assert_eq!(
            unwrap_call_response("search", body).unwrap(),
            json!({"items": [1, 2]})
        );
    }

    #[test]
    fn test_plain_text_content() {
        let body = json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(unwrap_call_response("echo", body).unwrap(), json!("hello"));
    }

    #[test]
    fn test_multiple_content_items_become_array() {
        let body = json!({"content": [
            {"type": "text", "text": "a"},
            {"type": "text", "text": "b"}
        ]});
        assert_eq!(unwrap_call_response("echo", body).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_is_error_becomes_tool_failed() {
        let body = json!({
            "content": [{"type": "text", "text": "Bad credentials"}],
            "isError": true
        });
        let err = unwrap_call_response("list_repos", body).unwrap_err();
        assert!(matches!(
            err,
            McpError::ToolFailed { ref tool, ref message } if tool == "list_repos" && message == "Bad credentials"
        ));
    }

    #[test]
    fn test_structured_content_preferred() {
        let body = json!({
            "content": [{"type": "text", "text": "3 results"}],
            "structuredContent": {"count": 3}
        });
        assert_eq!(unwrap_call_response("search", body).unwrap(), json!({"count": 3}));
    }

    #[test]
    fn test_domain_content_field_is_not_an_envelope() {
        // A payload that merely has a "content" field of strings is left alone.
        let body = json!({"content": ["line one", "line two"]});
        assert_eq!(unwrap_call_response("read", body.clone()).unwrap(), body);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error": "Bad credentials"}"#), "Bad credentials");
        assert_eq!(
            error_message(r#"{"error": {"message": "quota exceeded"}}"#),
            "quota exceeded"
        );
        assert_eq!(error_message(r#"{"message": "Not Found"}"#), "Not Found");
        assert_eq!(error_message("upstream exploded"), "upstream exploded");
        assert_eq!(error_message("  "), "empty response body");
    }
}
