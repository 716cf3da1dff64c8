//! Structural validators translated from tool input schemas.
//!
//! [`translate_schema`] turns the JSON Schema a service advertises into a
//! [`Validator`] tree. Only the structural part of JSON Schema is honoured
//! (types, `properties`, `required`, `items`, `enum`); anything else is
//! ignored and unknown types become [`Validator::Any`].

use serde_json::{Map, Value};

/// A structural validator for one schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Any,
    String { allowed: Option<Vec<Value>> },
    Number,
    Integer,
    Boolean,
    Null,
    Array(Box<Validator>),
    Object {
        fields: Vec<Field>,
        /// Closed objects reject keys not listed in `fields`.
        closed: bool,
    },
    /// `"type": [..]` unions; a value passes when any member passes.
    OneOf(Vec<Validator>),
}

/// A named object property.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub validator: Validator,
    pub required: bool,
}

/// Translate a JSON Schema node into a validator.
pub fn translate_schema(schema: &Value) -> Validator {
    match schema.get("type") {
        Some(Value::String(ty)) => translate_type(ty, schema),
        Some(Value::Array(types)) => {
            let members: Vec<Validator> = types
                .iter()
                .filter_map(Value::as_str)
                .map(|ty| translate_type(ty, schema))
                .collect();
            match members.len() {
                0 => Validator::Any,
                1 => members.into_iter().next().unwrap_or(Validator::Any),
                _ => Validator::OneOf(members),
            }
        }
        // Untyped schemas that still declare properties are objects.
        _ if schema.get("properties").is_some() => translate_type("object", schema),
        _ => Validator::Any,
    }
}

fn translate_type(ty: &str, schema: &Value) -> Validator {
    match ty {
        "string" => Validator::String {
            allowed: schema.get("enum").and_then(Value::as_array).cloned(),
        },
        "number" => Validator::Number,
        "integer" => Validator::Integer,
        "boolean" => Validator::Boolean,
        "null" => Validator::Null,
        "array" => Validator::Array(Box::new(
            schema
                .get("items")
                .map(translate_schema)
                .unwrap_or(Validator::Any),
        )),
        "object" => {
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let fields = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, prop)| Field {
                            name: name.clone(),
                            validator: translate_schema(prop),
                            required: required.contains(&name.as_str()),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Validator::Object {
                fields,
                closed: schema.get("additionalProperties") == Some(&Value::Bool(false)),
            }
        }
        _ => Validator::Any,
    }
}

impl Validator {
    /// Check a value, returning every violation found (empty means valid).
    pub fn validate(&self, value: &Value, path: &str) -> Vec<String> {
        let mut errors = Vec::new();
        self.check(value, path, &mut errors);
        errors
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        match self {
            Self::Any => {}
            Self::String { allowed } => match value {
                Value::String(_) => {
                    if let Some(allowed) = allowed
                        && !allowed.contains(value)
                    {
                        errors.push(format!(
                            "{path}: {value} is not one of {}",
                            Value::Array(allowed.clone())
                        ));
                    }
                }
                other => errors.push(type_mismatch(path, "string", other)),
            },
            Self::Number => {
                if !value.is_number() {
                    errors.push(type_mismatch(path, "number", value));
                }
            }
            Self::Integer => {
                if !(value.is_i64() || value.is_u64()) {
                    errors.push(type_mismatch(path, "integer", value));
                }
            }
            Self::Boolean => {
                if !value.is_boolean() {
                    errors.push(type_mismatch(path, "boolean", value));
                }
            }
            Self::Null => {
                if !value.is_null() {
                    errors.push(type_mismatch(path, "null", value));
                }
            }
            Self::Array(items) => match value {
                Value::Array(values) => {
                    for (i, item) in values.iter().enumerate() {
                        items.check(item, &format!("{path}[{i}]"), errors);
                    }
                }
                other => errors.push(type_mismatch(path, "array", other)),
            },
            Self::Object { fields, closed } => match value {
                Value::Object(map) => check_object(fields, *closed, map, path, errors),
                other => errors.push(type_mismatch(path, "object", other)),
            },
            Self::OneOf(members) => {
                if !members.iter().any(|m| m.validate(value, path).is_empty()) {
                    errors.push(format!("{path}: {} matches none of the allowed types", kind_of(value)));
                }
            }
        }
    }

    /// Whether an object validated by `self` may carry `key`. Only closed
    /// objects reject undeclared keys.
    pub fn accepts_key(&self, key: &str) -> bool {
        match self {
            Self::Object { fields, closed: true } => fields.iter().any(|f| f.name == key),
            _ => true,
        }
    }

    /// Fix obvious type mismatches: numeric strings for numbers, "true" and
    /// "false" for booleans, a scalar where an array is expected. Values that
    /// cannot be coerced are returned unchanged for validation to report.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::String(s)),
                Err(_) => Value::String(s),
            },
            (Self::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (Self::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f)
                    if f.fract() == 0.0
                        && n.as_i64().is_none()
                        && n.as_u64().is_none()
                        && (I64_MIN_F64..I64_MAX_F64).contains(&f) =>
                {
                    Value::from(f as i64)
                }
                _ => Value::Number(n),
            },
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(s),
            },
            (Self::String { .. }, Value::Number(n)) => Value::String(n.to_string()),
            (Self::Array(items), Value::Array(values)) => {
                Value::Array(values.into_iter().map(|v| items.coerce(v)).collect())
            }
            (Self::Array(items), scalar) if !scalar.is_null() && !scalar.is_object() => {
                Value::Array(vec![items.coerce(scalar)])
            }
            (Self::Object { fields, .. }, Value::Object(mut map)) => {
                for field in fields {
                    if let Some(current) = map.remove(&field.name) {
                        map.insert(field.name.clone(), field.validator.coerce(current));
                    }
                }
                Value::Object(map)
            }
            (_, other) => other,
        }
    }
}

// i64::MAX is not representable as f64; 2^63 is the exclusive bound.
const I64_MIN_F64: f64 = -9_223_372_036_854_775_808.0;
const I64_MAX_F64: f64 = 9_223_372_036_854_775_808.0;

fn check_object(
    fields: &[Field],
    closed: bool,
    map: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    for field in fields {
        let field_path = format!("{path}.{}", field.name);
        match map.get(&field.name) {
            Some(Value::Null) if !field.required => {}
            Some(value) => field.validator.check(value, &field_path, errors),
            None if field.required => {
                errors.push(format!("{field_path}: missing required field"));
            }
            None => {}
        }
    }
    if closed {
        for key in map.keys() {
            if !fields.iter().any(|f| &f.name == key) {
                errors.push(format!("{path}.{key}: unexpected field"));
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(path: &str, expected: &str, found: &Value) -> String {
    format!("{path}: expected {expected}, got {}", kind_of(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn search_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" },
                "include_forks": { "type": "boolean" },
                "labels": { "type": "array", "items": { "type": "string" } },
                "sort": { "type": "string", "enum": ["stars", "updated"] },
                "owner": {
                    "type": "object",
                    "properties": { "login": { "type": "string" } },
                    "required": ["login"]
                },
                "extra": { "description": "anything" }
            },
            "required": ["query"]
        })
    }

    #[test]
    fn test_translate_nested_structure() {
        let validator = translate_schema(&search_schema());
        let Validator::Object { fields, closed } = validator else {
            panic!("expected object validator");
        };
        assert!(!closed);
        let query = fields.iter().find(|f| f.name == "query").unwrap();
        assert!(query.required);
        let owner = fields.iter().find(|f| f.name == "owner").unwrap();
        assert!(!owner.required);
        assert!(matches!(owner.validator, Validator::Object { .. }));
        let extra = fields.iter().find(|f| f.name == "extra").unwrap();
        assert_eq!(extra.validator, Validator::Any);
    }

    #[test]
    fn test_unknown_type_is_any() {
        assert_eq!(translate_schema(&json!({"type": "date-time"})), Validator::Any);
        assert_eq!(translate_schema(&json!({})), Validator::Any);
    }

    #[test]
    fn test_validate_reports_all_violations() {
        let validator = translate_schema(&search_schema());
        let errors = validator.validate(
            &json!({
                "limit": "ten",
                "sort": "random",
                "owner": {}
            }),
            "args",
        );
        assert_eq!(
            errors,
            vec![
                "args.limit: expected integer, got string".to_string(),
                "args.owner.login: missing required field".to_string(),
                "args.query: missing required field".to_string(),
                "args.sort: \"random\" is not one of [\"stars\",\"updated\"]".to_string(),
            ]
        );
    }

    #[test]
    fn test_coerce_then_validate() {
        let validator = translate_schema(&search_schema());
        let coerced = validator.coerce(json!({
            "query": "rust",
            "limit": "10",
            "include_forks": "false",
            "labels": "good first issue"
        }));

        assert_eq!(
            coerced,
            json!({
                "query": "rust",
                "limit": 10,
                "include_forks": false,
                "labels": ["good first issue"]
            })
        );
        assert!(validator.validate(&coerced, "args").is_empty());
    }

    #[test]
    fn test_uncoercible_values_are_left_alone() {
        let validator = translate_schema(&json!({
            "type": "object",
            "properties": { "amount": { "type": "number" } }
        }));
        let coerced = validator.coerce(json!({"amount": "lots"}));
        assert_eq!(coerced, json!({"amount": "lots"}));
        assert_eq!(validator.validate(&coerced, "args").len(), 1);
    }

    #[test]
    fn test_closed_object_rejects_unknown_keys() {
        let validator = translate_schema(&json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "additionalProperties": false
        }));
        let errors = validator.validate(&json!({"id": "1", "other": 2}), "args");
        assert_eq!(errors, vec!["args.other: unexpected field".to_string()]);
    }

    #[test]
    fn test_whole_floats_outside_i64_stay_floats() {
        let validator = Validator::Integer;
        assert_eq!(validator.coerce(json!(3.0)), json!(3));

        let huge = validator.coerce(json!(1e20));
        assert_eq!(huge, json!(1e20));
        assert_eq!(
            validator.validate(&huge, "args.count"),
            vec!["args.count: expected integer, got number".to_string()]
        );
        assert_eq!(validator.coerce(json!(-1e19)), json!(-1e19));
    }

    #[test]
    fn test_accepts_key() {
        let closed = translate_schema(&json!({
            "type": "object",
            "properties": { "price": { "type": "number" } },
            "additionalProperties": false
        }));
        assert!(closed.accepts_key("price"));
        assert!(!closed.accepts_key("symbol"));

        let open = translate_schema(&json!({
            "type": "object",
            "properties": { "price": { "type": "number" } }
        }));
        assert!(open.accepts_key("symbol"));
        assert!(Validator::Any.accepts_key("symbol"));
    }

    #[test]
    fn test_type_union() {
        let validator = translate_schema(&json!({"type": ["string", "null"]}));
        assert!(validator.validate(&json!("x"), "v").is_empty());
        assert!(validator.validate(&Value::Null, "v").is_empty());
        assert_eq!(validator.validate(&json!(3), "v").len(), 1);
    }
}
