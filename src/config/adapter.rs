use std::time::Duration;

use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;
use crate::tools::mcp::RetryPolicy;

/// Default per-call timeout for tool invocations.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on a tool response body (5 MB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 5 * 1024 * 1024;

/// Network behaviour of the tool-service adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Per-call timeout, applied to every attempt.
    pub call_timeout: Duration,
    /// Transport retry budget and backoff.
    pub retry: RetryPolicy,
    /// Maximum accepted response body size.
    pub max_response_bytes: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry: RetryPolicy::default(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl AdapterConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_secs: u64 =
            parse_optional_env("MCP_TIMEOUT_SECS", defaults.call_timeout.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MCP_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let max_attempts: u32 = parse_optional_env("MCP_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MCP_MAX_ATTEMPTS".to_string(),
                message: "must allow at least one attempt".to_string(),
            });
        }

        let backoff_base_ms: u64 = parse_optional_env(
            "MCP_BACKOFF_BASE_MS",
            defaults.retry.base_delay.as_millis() as u64,
        )?;

        Ok(Self {
            call_timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(backoff_base_ms),
            },
            max_response_bytes: parse_optional_env(
                "MCP_MAX_RESPONSE_BYTES",
                defaults.max_response_bytes,
            )?,
        })
    }
}
