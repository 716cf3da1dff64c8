//! Scrubbing of sensitive data before it reaches progress events or logs.

use serde_json::{Map, Value};

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_EXACT: &[&str] = &[
    "authorization",
    "bearer",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "passwd",
    "pass",
    "private_key",
];

// Matched after lowercasing and stripping `-`/`_`, so `apiKey`, `api_key`
// and `API-KEY` all hit "apikey". Plain "auth" is too broad ("author"), and
// plain "token" names ordinary data (`token`, `max_tokens`).
const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "secret",
    "password",
    "credential",
    "apikey",
    "accesskey",
];

/// Token-shaped keys: `access_token`, `GITHUB_TOKEN`, `refreshToken`,
/// `x-auth-token`. A bare `token` or `tokens` is left alone.
fn is_token_key(key: &str, lower: &str) -> bool {
    lower.ends_with("_token") || lower.ends_with("-token") || (key.ends_with("Token") && key.len() > 5)
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    if SENSITIVE_EXACT.contains(&lower.as_str()) || is_token_key(key, &lower) {
        return true;
    }
    let squashed: String = lower.chars().filter(|c| *c != '_' && *c != '-').collect();
    SENSITIVE_SUBSTRINGS.iter().any(|s| squashed.contains(s))
}

fn redact_in_place(value: &mut Value, secrets: &[&str]) {
    match value {
        Value::Object(map) => redact_object(map, secrets),
        Value::Array(items) => {
            for item in items {
                redact_in_place(item, secrets);
            }
        }
        Value::String(s) => {
            if secrets.iter().any(|secret| s.contains(secret)) {
                *s = scrub_text(s, secrets);
            }
        }
        _ => {}
    }
}

fn redact_object(map: &mut Map<String, Value>, secrets: &[&str]) {
    for (key, val) in map {
        if is_sensitive_key(key) {
            *val = Value::String(REDACTED.to_string());
        } else {
            redact_in_place(val, secrets);
        }
    }
}

/// Replace values under sensitive keys with `[REDACTED]`.
pub fn redact_sensitive_json(value: &Value) -> Value {
    redact_with_secrets(value, &[])
}

/// Key-based redaction plus removal of known secret values wherever they
/// appear inside strings (tools sometimes echo the token they were given).
pub fn redact_with_secrets(value: &Value, secrets: &[&str]) -> Value {
    let secrets: Vec<&str> = secrets.iter().copied().filter(|s| s.len() >= 4).collect();
    let mut cloned = value.clone();
    redact_in_place(&mut cloned, &secrets);
    cloned
}

/// Replace every occurrence of the given secret values in free text.
pub fn scrub_text(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_string();
    for secret in secrets.iter().filter(|s| s.len() >= 4) {
        out = out.replace(secret, REDACTED);
    }
    out
}
