use std::time::Duration;

use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// Chain runner behaviour.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Size of streamed result chunks in characters (0 disables chunking).
    pub chunk_size: usize,
    /// Maximum characters of input/raw result echoed into progress events.
    pub event_preview_chars: usize,
    /// Upper bound on best-effort error enrichment.
    pub enrich_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 0,
            event_preview_chars: 2000,
            enrich_timeout: Duration::from_secs(5),
        }
    }
}

impl RunnerConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            chunk_size: parse_optional_env("STEPCHAIN_CHUNK_SIZE", defaults.chunk_size)?,
            event_preview_chars: parse_optional_env(
                "STEPCHAIN_EVENT_PREVIEW_CHARS",
                defaults.event_preview_chars,
            )?,
            enrich_timeout: Duration::from_secs(parse_optional_env(
                "STEPCHAIN_ENRICH_TIMEOUT_SECS",
                defaults.enrich_timeout.as_secs(),
            )?),
        })
    }
}
