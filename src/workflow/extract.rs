//! Reshaping a step's result into the next step's input.

use serde_json::{Map, Value};

/// Strategy for turning the previous result into the next input.
///
/// Implementations always return a JSON object.
pub trait DataExtractor: Send + Sync {
    fn extract(&self, previous: &Value, next_action: &str) -> Value;
}

/// Passes the previous result through unchanged (objects) or wrapped as
/// `{"input": value}` (everything else).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityExtractor;

impl DataExtractor for IdentityExtractor {
    fn extract(&self, previous: &Value, _next_action: &str) -> Value {
        wrap(previous.clone())
    }
}

fn wrap(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other);
            Value::Object(map)
        }
    }
}

const ENVELOPE_KEYS: &[&str] = &["data", "result", "results", "items", "payload"];
const LIST_WORDS: &[&str] = &["all", "each", "every", "list", "batch", "many", "multiple", "items"];

/// Field groups picked when the next action mentions one of the triggers.
const FIELD_GROUPS: &[(&[&str], &[&str])] = &[
    (&["id", "ids", "identifier"], &["id"]),
    (
        &["url", "link", "links", "open", "visit", "fetch", "download", "page"],
        &["url", "link", "href"],
    ),
    (
        &["query", "search", "find", "lookup", "look"],
        &["query", "q", "search", "keyword", "keywords"],
    ),
];

/// Best-effort reshaping with an identity fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    /// Strip `{data: ...}`-style wrappers around the interesting part.
    fn unwrap_envelope(mut value: &Value) -> &Value {
        for _ in 0..3 {
            let Value::Object(map) = value else { break };
            let inner = ENVELOPE_KEYS.iter().find_map(|key| {
                map.get(*key)
                    .filter(|v| v.is_object() || v.is_array())
            });
            match inner {
                // Only unwrap when the wrapper is mostly envelope metadata.
                Some(inner) if map.len() <= 3 => value = inner,
                _ => break,
            }
        }
        value
    }

    fn pick_fields(map: &Map<String, Value>, action_tokens: &[String]) -> Map<String, Value> {
        let mut picked = Map::new();
        for (triggers, fields) in FIELD_GROUPS {
            if !action_tokens.iter().any(|t| triggers.contains(&t.as_str())) {
                continue;
            }
            for (key, value) in map {
                let lower = key.to_lowercase();
                let hit = fields.iter().any(|f| {
                    lower == *f || lower.ends_with(&format!("_{f}"))
                });
                if hit && !value.is_null() {
                    picked.insert(key.clone(), value.clone());
                }
            }
        }
        picked
    }
}

impl DataExtractor for HeuristicExtractor {
    fn extract(&self, previous: &Value, next_action: &str) -> Value {
        let tokens: Vec<String> = next_action
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        let wants_list = tokens.iter().any(|t| LIST_WORDS.contains(&t.as_str()));

        let core = Self::unwrap_envelope(previous);
        match core {
            Value::Array(items) if wants_list => {
                let mut map = Map::new();
                map.insert("items".to_string(), Value::Array(items.clone()));
                Value::Object(map)
            }
            Value::Array(items) => match items.first() {
                Some(first @ Value::Object(_)) => self.extract(first, next_action),
                _ => wrap(core.clone()),
            },
            Value::Object(map) => {
                let picked = Self::pick_fields(map, &tokens);
                if picked.is_empty() {
                    core.clone()
                } else {
                    Value::Object(picked)
                }
            }
            other => wrap(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_identity_wraps_scalars() {
        assert_eq!(IdentityExtractor.extract(&json!(42), "anything"), json!({"input": 42}));
        assert_eq!(
            IdentityExtractor.extract(&json!({"a": 1}), "anything"),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_unwraps_envelope() {
        let previous = json!({"status": "ok", "data": {"price": 65000, "symbol": "BTC"}});
        assert_eq!(
            HeuristicExtractor.extract(&previous, "convert to eur"),
            json!({"price": 65000, "symbol": "BTC"})
        );
    }

    #[test]
    fn test_keeps_list_for_list_actions() {
        let previous = json!({"results": [{"id": 1}, {"id": 2}]});
        assert_eq!(
            HeuristicExtractor.extract(&previous, "summarize all results"),
            json!({"items": [{"id": 1}, {"id": 2}]})
        );
    }

    #[test]
    fn test_takes_first_item_for_singular_actions() {
        let previous = json!({"items": [{"id": 7, "url": "https://x.test/7", "title": "seven"}]});
        assert_eq!(
            HeuristicExtractor.extract(&previous, "open the link"),
            json!({"url": "https://x.test/7"})
        );
    }

    #[test]
    fn test_picks_id_fields() {
        let previous = json!({"repo_id": 99, "name": "stepchain", "stars": 3});
        assert_eq!(
            HeuristicExtractor.extract(&previous, "get issues by repo id"),
            json!({"repo_id": 99})
        );
    }

    #[test]
    fn test_falls_back_to_identity() {
        let previous = json!({"temperature": 21.5, "unit": "C"});
        assert_eq!(
            HeuristicExtractor.extract(&previous, "write a haiku"),
            previous
        );
        assert_eq!(
            HeuristicExtractor.extract(&json!("plain text"), "translate"),
            json!({"input": "plain text"})
        );
    }

    #[test]
    fn test_large_objects_are_not_unwrapped() {
        let previous = json!({"data": {"x": 1}, "a": 1, "b": 2, "c": 3});
        assert_eq!(HeuristicExtractor.extract(&previous, "next"), previous);
    }
}
