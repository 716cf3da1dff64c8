//! Service endpoint registry and tool-definition cache.
//!
//! The registry is an ordinary value built by the wiring code and shared via
//! `Arc`. Reads dominate: endpoints are registered at startup and tool
//! catalogs are populated once per service, so both maps sit behind
//! `std::sync::RwLock` with critical sections that never cross an `.await`.
//! Concurrent catalog population is last-writer-wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::McpError;
use crate::tools::tool::ToolDefinition;

/// A named tool service reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Registry name used by plans (`mcp_name`).
    pub name: String,
    /// Base URL; `/tools` and `/tools/call` are resolved against it.
    pub base_url: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether calls need per-user credentials.
    #[serde(default)]
    pub requires_auth: bool,
    /// Call-time environment template. Empty values are filled from the
    /// user's credential; non-empty values are fixed configuration.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Request headers; values may reference `${VAR}` from the environment.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-service override of the adapter call timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ServiceEndpoint {
    /// Create an endpoint with no authentication requirements.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            description: None,
            requires_auth: false,
            env: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_secs: None,
        }
    }

    /// Mark the service as credentialed, with the given env template.
    pub fn with_auth<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.requires_auth = true;
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a request header template.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the call timeout for this service.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Per-service timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Build a URL below the service base.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check that the endpoint is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("service name must not be empty".to_string());
        }
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| format!("service '{}': invalid base_url: {}", self.name, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "service '{}': base_url must use http or https, got '{}'",
                self.name,
                parsed.scheme()
            ));
        }
        Ok(())
    }
}

/// Canonical form of a service name for lookups.
pub fn normalize_service_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Registry of tool services plus the shared tool-definition cache.
#[derive(Default)]
pub struct ServiceRegistry {
    endpoints: RwLock<HashMap<String, ServiceEndpoint>>,
    tool_cache: RwLock<HashMap<String, Arc<Vec<ToolDefinition>>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with endpoints.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = ServiceEndpoint>) -> Self {
        let registry = Self::new();
        for endpoint in endpoints {
            registry.register(endpoint);
        }
        registry
    }

    /// Register (or replace) an endpoint. Returns the previous entry.
    ///
    /// Replacing an endpoint drops its cached tool catalog.
    pub fn register(&self, endpoint: ServiceEndpoint) -> Option<ServiceEndpoint> {
        let key = normalize_service_name(&endpoint.name);
        let previous = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), endpoint);
        if previous.is_some() {
            self.invalidate(&key);
        }
        previous
    }

    /// Look up an endpoint by name.
    pub fn resolve(&self, name: &str) -> Result<ServiceEndpoint, McpError> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_service_name(name))
            .cloned()
            .ok_or_else(|| McpError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    /// Whether a service is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize_service_name(name))
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered services.
    pub fn count(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cached tool catalog for a service, if discovery already ran.
    pub fn cached_tools(&self, service: &str) -> Option<Arc<Vec<ToolDefinition>>> {
        self.tool_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_service_name(service))
            .cloned()
    }

    /// Store a discovered catalog (last writer wins).
    pub fn store_tools(
        &self,
        service: &str,
        tools: Vec<ToolDefinition>,
    ) -> Arc<Vec<ToolDefinition>> {
        let tools = Arc::new(tools);
        self.tool_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_service_name(service), Arc::clone(&tools));
        tools
    }

    /// Drop the cached catalog of one service.
    pub fn invalidate(&self, service: &str) {
        self.tool_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_service_name(service));
    }

    /// Drop every cached catalog.
    pub fn clear_cache(&self) {
        self.tool_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, "test tool")
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = ServiceRegistry::from_endpoints([ServiceEndpoint::new(
            "GitHub",
            "https://tools.example.com/github",
        )]);

        assert_eq!(registry.resolve(" github ").unwrap().name, "GitHub");
        assert!(registry.contains("GITHUB"));
    }

    #[test]
    fn test_resolve_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = registry.resolve("nonexistent-tool").unwrap_err();
        assert!(matches!(err, McpError::ServiceNotFound { ref name } if name == "nonexistent-tool"));
    }

    #[test]
    fn test_tool_cache_and_clear() {
        let registry = ServiceRegistry::new();
        assert!(registry.cached_tools("svc").is_none());

        registry.store_tools("svc", vec![tool("a"), tool("b")]);
        assert_eq!(registry.cached_tools("SVC").unwrap().len(), 2);

        registry.clear_cache();
        assert!(registry.cached_tools("svc").is_none());
    }

    #[test]
    fn test_reregister_invalidates_catalog() {
        let registry = ServiceRegistry::new();
        registry.register(ServiceEndpoint::new("svc", "https://a.example.com"));
        registry.store_tools("svc", vec![tool("a")]);

        let previous = registry.register(ServiceEndpoint::new("svc", "https://b.example.com"));
        assert_eq!(previous.unwrap().base_url, "https://a.example.com");
        assert!(registry.cached_tools("svc").is_none());
    }

    #[test]
    fn test_endpoint_url_join() {
        let endpoint = ServiceEndpoint::new("svc", "https://a.example.com/mcp/");
        assert_eq!(endpoint.url("/tools/call"), "https://a.example.com/mcp/tools/call");
    }

    #[test]
    fn test_endpoint_validate() {
        assert!(ServiceEndpoint::new("svc", "https://a.example.com").validate().is_ok());
        assert!(ServiceEndpoint::new("", "https://a.example.com").validate().is_err());
        assert!(ServiceEndpoint::new("svc", "not a url").validate().is_err());
        assert!(ServiceEndpoint::new("svc", "file:///etc/passwd").validate().is_err());
    }

    #[test]
    fn test_with_auth_sets_template() {
        let endpoint = ServiceEndpoint::new("github", "https://a.example.com")
            .with_auth([("GITHUB_TOKEN", "")]);
        assert!(endpoint.requires_auth);
        assert_eq!(endpoint.env.get("GITHUB_TOKEN").map(String::as_str), Some(""));
    }
}
