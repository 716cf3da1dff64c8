//! Tool definitions and invocation results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A tool advertised by a service during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the tool's arguments.
    #[serde(
        default = "empty_object_schema",
        rename = "inputSchema",
        alias = "input_schema"
    )]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    /// Create a definition that accepts an empty object.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_object_schema(),
        }
    }

    /// Set the input schema.
    pub fn with_schema(mut self, input_schema: serde_json::Value) -> Self {
        self.input_schema = input_schema;
        self
    }
}

/// Output of a successful tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The unwrapped result payload.
    pub content: serde_json::Value,
    /// Wall time across all attempts.
    pub duration: Duration,
    /// Attempts the adapter needed (1 when the first call succeeded).
    pub attempts: u32,
    /// Raw response body before unwrapping (for debugging).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ToolResult {
    /// A first-attempt success.
    pub fn success(content: serde_json::Value, duration: Duration) -> Self {
        Self {
            content,
            duration,
            attempts: 1,
            raw: None,
        }
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the raw body.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// Lenient structural check of a discovered tool's input schema.
///
/// Used at discovery time to log malformed catalogs. Nothing is rejected:
/// a tool with a sloppy schema is still callable.
///
/// # Rules
///
/// 1. Top-level must have `"type": "object"`
/// 2. `"properties"`, when present, must be an object (absent means no arguments)
/// 3. Every key in `"required"` must exist in `"properties"`
/// 4. Nested objects follow the same rules recursively
/// 5. Array properties should have `"items"` defined
///
/// Properties without a `"type"` field are freeform and allowed.
pub fn validate_tool_schema(schema: &serde_json::Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        Some(other) => {
            errors.push(format!("{path}: expected type \"object\", got \"{other}\""));
            return errors;
        }
        None => {
            errors.push(format!("{path}: missing \"type\": \"object\""));
            return errors;
        }
    }

    let empty = serde_json::Map::new();
    let properties = match schema.get("properties") {
        None => &empty,
        Some(serde_json::Value::Object(p)) => p,
        Some(_) => {
            errors.push(format!("{path}: \"properties\" must be an object"));
            return errors;
        }
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|r| r.as_str()) {
            if !properties.contains_key(key) {
                errors.push(format!(
                    "{path}: required key \"{key}\" not found in properties"
                ));
            }
        }
    }

    for (key, prop) in properties {
        let prop_path = format!("{path}.{key}");
        match prop.get("type").and_then(|t| t.as_str()) {
            Some("object") if prop.get("properties").is_some() => {
                errors.extend(validate_tool_schema(prop, &prop_path));
            }
            Some("array") => match prop.get("items") {
                Some(items) if items.get("type").and_then(|t| t.as_str()) == Some("object") => {
                    errors.extend(validate_tool_schema(items, &format!("{prop_path}.items")));
                }
                Some(_) => {}
                None => errors.push(format!("{prop_path}: array property missing \"items\"")),
            },
            _ => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_deserializes_wire_names() {
        let def: ToolDefinition = serde_json::from_value(serde_json::json!({
            "name": "get_price",
            "description": "Current price for a symbol",
            "inputSchema": {
                "type": "object",
                "properties": { "symbol": { "type": "string" } },
                "required": ["symbol"]
            }
        }))
        .unwrap();

        assert_eq!(def.name, "get_price");
        assert_eq!(def.input_schema["required"][0], "symbol");
    }

    #[test]
    fn test_definition_defaults_schema() {
        let def: ToolDefinition =
            serde_json::from_value(serde_json::json!({ "name": "ping" })).unwrap();
        assert_eq!(def.description, "");
        assert!(validate_tool_schema(&def.input_schema, "ping").is_empty());
    }

    #[test]
    fn test_validate_schema_valid() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "A name" }
            },
            "required": ["name"]
        });
        let errors = validate_tool_schema(&schema, "test");
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_validate_schema_without_properties_is_allowed() {
        let errors = validate_tool_schema(&serde_json::json!({ "type": "object" }), "test");
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_validate_schema_wrong_type() {
        let errors = validate_tool_schema(&serde_json::json!({ "type": "string" }), "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expected type \"object\""));
    }

    #[test]
    fn test_validate_schema_required_not_in_properties() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name", "age"]
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"age\" not found in properties"));
    }

    #[test]
    fn test_validate_schema_nested_array_items_object_bad() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "field": { "type": "string" } },
                        "required": ["field", "op"]
                    }
                },
                "tags": { "type": "array" }
            }
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("filters.items")));
        assert!(errors.iter().any(|e| e.contains("array property missing \"items\"")));
    }

    #[test]
    fn test_tool_result_builders() {
        let result = ToolResult::success(serde_json::json!({"ok": true}), Duration::from_millis(5))
            .with_attempts(3)
            .with_raw("{\"ok\":true}");
        assert_eq!(result.attempts, 3);
        assert_eq!(result.raw.as_deref(), Some("{\"ok\":true}"));
    }
}
