use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;
use crate::tools::mcp::ServiceEndpoint;

/// Declared tool services, loaded from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct ServicesConfig {
    /// File the services were loaded from (if any).
    pub path: Option<PathBuf>,
    /// Service endpoints to register at startup.
    pub services: Vec<ServiceEndpoint>,
}

#[derive(Debug, Deserialize)]
struct ServicesFile {
    #[serde(default, rename = "service")]
    services: Vec<ServiceEndpoint>,
}

impl ServicesConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        match optional_env("STEPCHAIN_SERVICES")? {
            // An explicit path must exist.
            Some(path) => Self::load_from(Path::new(&path)),
            None => {
                let path = default_services_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    tracing::debug!(
                        "No services file at {}, starting with an empty registry",
                        path.display()
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate a services file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let services = Self::parse(&raw).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            services,
        })
    }

    /// Parse the TOML body of a services file.
    pub fn parse(raw: &str) -> Result<Vec<ServiceEndpoint>, String> {
        let file: ServicesFile = toml::from_str(raw).map_err(|e| e.to_string())?;

        let mut seen = std::collections::HashSet::new();
        for service in &file.services {
            service.validate()?;
            if !seen.insert(crate::tools::mcp::normalize_service_name(&service.name)) {
                return Err(format!("duplicate service name '{}'", service.name));
            }
        }

        Ok(file.services)
    }
}

/// Default services file (~/.stepchain/services.toml).
pub fn default_services_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stepchain")
        .join("services.toml")
}
