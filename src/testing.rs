//! Test doubles for exercising the chain runner without network services.
//!
//! Provides:
//! - [`StubRuntime`]: a scripted [`ToolRuntime`] with call recording
//! - [`RecordingSink`]: an [`EventSink`] that keeps every event
//! - [`encrypted_record`]: builds a stored credential record for a user
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepchain::testing::{RecordingSink, StubRuntime};
//! use stepchain::workflow::{ChainRunner, RunRequest, WorkflowStep};
//!
//! # async fn demo() {
//! let runtime = Arc::new(
//!     StubRuntime::new()
//!         .with_service("crypto")
//!         .respond("crypto", "get_price", json!({"price": 65000})),
//! );
//! let sink = RecordingSink::new();
//! let steps = vec![WorkflowStep::new(1, "crypto", "get price", json!({"symbol": "BTC"}))];
//! ChainRunner::new(runtime)
//!     .run(RunRequest::new("task-1", "alice", steps), &sink)
//!     .await
//!     .unwrap();
//! # }
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;
use crate::events::{EventSink, ProgressEvent};
use crate::secrets::{CredentialRecord, SecretsCrypto};
use crate::tools::mcp::{ServiceEndpoint, ServiceRegistry, normalize_service_name};
use crate::tools::{CallContext, ToolDefinition, ToolResult, ToolRuntime};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub service: String,
    pub tool: String,
    pub arguments: Value,
    /// Env the call received, sorted by key.
    pub env: BTreeMap<String, String>,
}

#[derive(Default)]
struct ToolScript {
    failures: VecDeque<McpError>,
    response: Option<Value>,
}

/// A scripted tool runtime.
///
/// Services must be registered with [`with_service`](Self::with_service) or
/// [`with_auth_service`](Self::with_auth_service) to resolve. Each scripted
/// tool first drains its queued failures, then returns its response.
pub struct StubRuntime {
    registry: ServiceRegistry,
    catalogs: Mutex<HashMap<String, Vec<ToolDefinition>>>,
    scripts: Mutex<HashMap<(String, String), ToolScript>>,
    calls: Mutex<Vec<RecordedCall>>,
    invoke_count: AtomicU32,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
            catalogs: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            invoke_count: AtomicU32::new(0),
        }
    }

    /// Register a service that needs no credentials.
    pub fn with_service(self, name: &str) -> Self {
        self.with_endpoint(ServiceEndpoint::new(name, format!("http://{name}.stub.invalid")))
    }

    /// Register a service that requires a per-user token in `<NAME>_TOKEN`.
    pub fn with_auth_service(self, name: &str) -> Self {
        let key = format!("{}_TOKEN", name.to_uppercase());
        self.with_endpoint(
            ServiceEndpoint::new(name, format!("http://{name}.stub.invalid"))
                .with_auth([(key, String::new())]),
        )
    }

    pub fn with_endpoint(self, endpoint: ServiceEndpoint) -> Self {
        self.registry.register(endpoint);
        self
    }

    /// Add a tool with the given input schema to a service's catalog.
    pub fn with_tool(self, service: &str, tool: &str, schema: Value) -> Self {
        self.catalog_entry(service, ToolDefinition::new(tool, "").with_schema(schema));
        self
    }

    /// Script a successful response. Adds the tool to the catalog if absent.
    pub fn respond(self, service: &str, tool: &str, response: Value) -> Self {
        self.catalog_entry(service, ToolDefinition::new(tool, ""));
        self.script(service, tool, |s| s.response = Some(response));
        self
    }

    /// Queue a failure, returned before any scripted response.
    pub fn fail(self, service: &str, tool: &str, error: McpError) -> Self {
        self.catalog_entry(service, ToolDefinition::new(tool, ""));
        self.script(service, tool, |s| s.failures.push_back(error));
        self
    }

    fn catalog_entry(&self, service: &str, definition: ToolDefinition) {
        let mut catalogs = self.catalogs.lock().unwrap_or_else(PoisonError::into_inner);
        let tools = catalogs.entry(normalize_service_name(service)).or_default();
        if !tools.iter().any(|t| t.name == definition.name) {
            tools.push(definition);
        }
    }

    fn script(&self, service: &str, tool: &str, f: impl FnOnce(&mut ToolScript)) {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        f(scripts
            .entry((normalize_service_name(service), tool.to_string()))
            .or_default());
    }

    /// Number of `invoke` calls so far.
    pub fn invoke_count(&self) -> u32 {
        self.invoke_count.load(Ordering::Relaxed)
    }

    /// Every invocation in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRuntime for StubRuntime {
    fn resolve(&self, service: &str) -> Result<ServiceEndpoint, McpError> {
        self.registry.resolve(service)
    }

    async fn list_tools(
        &self,
        service: &str,
        _ctx: &CallContext,
    ) -> Result<Arc<Vec<ToolDefinition>>, McpError> {
        let endpoint = self.registry.resolve(service)?;
        let catalogs = self.catalogs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::new(
            catalogs.get(&normalize_service_name(&endpoint.name)).cloned().unwrap_or_default(),
        ))
    }

    async fn invoke(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
        ctx: &CallContext,
    ) -> Result<ToolResult, McpError> {
        self.invoke_count.fetch_add(1, Ordering::Relaxed);
        let endpoint = self.registry.resolve(service)?;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                service: endpoint.name.clone(),
                tool: tool.to_string(),
                arguments: arguments.clone(),
                env: ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            });

        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let script = scripts.get_mut(&(normalize_service_name(&endpoint.name), tool.to_string()));
        match script {
            Some(script) => {
                if let Some(error) = script.failures.pop_front() {
                    return Err(error);
                }
                match &script.response {
                    Some(response) => {
                        Ok(ToolResult::success(response.clone(), Duration::from_millis(1)))
                    }
                    None => Err(McpError::ToolFailed {
                        tool: tool.to_string(),
                        message: "no scripted response".to_string(),
                    }),
                }
            }
            None => Err(McpError::ToolFailed {
                tool: tool.to_string(),
                message: format!("unknown tool '{tool}'"),
            }),
        }
    }
}

/// Event sink that records everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event tags in emission order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(ProgressEvent::event_type)
            .collect()
    }

    pub fn events_by_type(&self, event_type: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Master key used by tests. Long enough for [`SecretsCrypto::new`].
pub const TEST_MASTER_KEY: &str = "stepchain-test-master-key-0123456789abcdef";

/// Encrypt `fields` into a credential record for `(user_id, tool_name)`.
pub fn encrypted_record(
    crypto: &SecretsCrypto,
    user_id: &str,
    tool_name: &str,
    fields: &[(&str, &str)],
    verified: bool,
) -> CredentialRecord {
    let fields: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CredentialRecord {
        user_id: user_id.to_string(),
        tool_name: tool_name.to_string(),
        encrypted_payload: crypto
            .encrypt_fields(&fields)
            .expect("test credential encrypts"),
        verified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_stub_drains_failures_then_responds() {
        let runtime = StubRuntime::new()
            .with_service("a")
            .fail("a", "t", McpError::Client("boom".to_string()))
            .respond("a", "t", json!(1));
        let ctx = CallContext::new("alice");

        assert!(runtime.invoke("a", "t", &json!({}), &ctx).await.is_err());
        let ok = runtime.invoke("a", "t", &json!({}), &ctx).await.unwrap();
        assert_eq!(ok.content, json!(1));
        assert_eq!(runtime.invoke_count(), 2);
    }

    #[tokio::test]
    async fn test_stub_catalog() {
        let runtime = StubRuntime::new()
            .with_service("a")
            .respond("a", "t", json!(1))
            .with_tool("a", "u", json!({"type": "object"}));
        let ctx = CallContext::new("alice");
        let tools = runtime.list_tools("a", &ctx).await.unwrap();
        assert_eq!(tools.len(), 2);
        assert!(runtime.list_tools("missing", &ctx).await.is_err());
    }
}
