//! Configuration for the execution engine.
//!
//! Settings are read from environment variables (after `.env` has been loaded
//! by the binary) with sensible defaults. Tool services are declared in a TOML
//! file so the registry can be built explicitly by the wiring code.

mod adapter;
pub(crate) mod helpers;
mod runner;
mod secrets;
mod services;

pub use adapter::{AdapterConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RESPONSE_BYTES};
pub use runner::RunnerConfig;
pub use secrets::{MIN_MASTER_KEY_LEN, SecretsConfig};
pub use services::{ServicesConfig, default_services_path};

use crate::error::ConfigError;

/// Full engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub adapter: AdapterConfig,
    pub secrets: SecretsConfig,
    pub services: ServicesConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            adapter: AdapterConfig::resolve()?,
            secrets: SecretsConfig::resolve()?,
            services: ServicesConfig::resolve()?,
            runner: RunnerConfig::resolve()?,
        })
    }
}
