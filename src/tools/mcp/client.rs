//! HTTP adapter for tool services.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::AdapterConfig;
use crate::error::{McpError, TransportKind};
use crate::tools::mcp::protocol::{
    ToolCallRequest, ToolListResponse, error_message, unwrap_call_response,
};
use crate::tools::mcp::registry::{ServiceEndpoint, ServiceRegistry};
use crate::tools::mcp::retry::retry_transport_from;
use crate::tools::tool::{ToolDefinition, ToolResult, validate_tool_schema};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Adapter that discovers and invokes tools on registered services.
pub struct McpAdapter {
    registry: Arc<ServiceRegistry>,
    client: Client,
    config: AdapterConfig,
}

impl McpAdapter {
    /// Create an adapter over an injected registry.
    pub fn new(registry: Arc<ServiceRegistry>, config: AdapterConfig) -> Result<Self, McpError> {
        let client = Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| McpError::Client(e.to_string()))?;

        Ok(Self {
            registry,
            client,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Look up a registered service.
    pub fn resolve(&self, service: &str) -> Result<ServiceEndpoint, McpError> {
        self.registry.resolve(service)
    }

    /// Drop every cached tool catalog.
    pub fn clear_cache(&self) {
        self.registry.clear_cache();
    }

    /// Discover the tools a service offers. Cached for the process lifetime.
    pub async fn list_tools(&self, service: &str) -> Result<Arc<Vec<ToolDefinition>>, McpError> {
        self.list_tools_with_env(service, &HashMap::new()).await
    }

    /// Discover tools, filling header placeholders from `env`.
    ///
    /// Discovery makes a single attempt. Transport retries are left to
    /// the invocation that follows, so a step never spends more than one
    /// retry budget.
    pub async fn list_tools_with_env(
        &self,
        service: &str,
        env: &HashMap<String, String>,
    ) -> Result<Arc<Vec<ToolDefinition>>, McpError> {
        if let Some(cached) = self.registry.cached_tools(service) {
            return Ok(cached);
        }

        let endpoint = self.resolve(service)?;
        let headers = render_headers(&endpoint, env);
        tracing::debug!(service = %endpoint.name, "Discovering tools");
        let request = self.prepare(self.client.get(endpoint.url("tools")), &endpoint, &headers);
        let (body, _raw) = self.send(request, &endpoint).await?;

        let tools = parse_tool_list(&endpoint.name, body)?;
        for tool in &tools {
            let problems =
                validate_tool_schema(&tool.input_schema, &format!("{}.{}", endpoint.name, tool.name));
            if !problems.is_empty() {
                tracing::warn!(
                    service = %endpoint.name,
                    tool = %tool.name,
                    "Tool schema has problems: {}",
                    problems.join("; ")
                );
            }
        }

        tracing::info!(service = %endpoint.name, count = tools.len(), "Discovered tools");
        Ok(self.registry.store_tools(&endpoint.name, tools))
    }

    /// Invoke a tool with no call-time environment.
    pub async fn invoke(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
    ) -> Result<ToolResult, McpError> {
        self.invoke_with_env(service, tool, arguments, &HashMap::new())
            .await
    }

    /// Invoke a tool. `env` fills `${VAR}` header placeholders.
    ///
    /// Transport failures are retried within the configured budget; the last
    /// error is returned once it is spent.
    pub async fn invoke_with_env(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
        env: &HashMap<String, String>,
    ) -> Result<ToolResult, McpError> {
        self.invoke_after(service, tool, arguments, env, 0).await
    }

    /// Invoke a tool when `spent` attempts of this call's budget already
    /// failed (for example a discovery request that timed out). At least one
    /// attempt is always made.
    pub async fn invoke_after(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
        env: &HashMap<String, String>,
        spent: u32,
    ) -> Result<ToolResult, McpError> {
        let endpoint = self.resolve(service)?;
        let endpoint = &endpoint;
        let url = endpoint.url("tools/call");
        let url = url.as_str();
        let headers = render_headers(endpoint, env);
        let headers = &headers;
        let payload = ToolCallRequest {
            name: tool,
            arguments,
        };
        let payload = &payload;

        let start = Instant::now();
        let ((body, raw), attempts) =
            retry_transport_from(&self.config.retry, "invoke", spent + 1, |attempt| {
                tracing::debug!(service = %endpoint.name, tool, attempt, "Invoking tool");
                let request = self.prepare(self.client.post(url).json(payload), endpoint, headers);
                async move { self.send(request, endpoint).await }
            })
            .await?;

        let content = unwrap_call_response(tool, body)?;
        Ok(ToolResult::success(content, start.elapsed())
            .with_attempts(attempts)
            .with_raw(raw))
    }

    fn prepare(
        &self,
        mut request: RequestBuilder,
        endpoint: &ServiceEndpoint,
        headers: &[(String, String)],
    ) -> RequestBuilder {
        if let Some(timeout) = endpoint.timeout() {
            request = request.timeout(timeout);
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// Send one request and read the body under the size cap.
    async fn send(
        &self,
        request: RequestBuilder,
        endpoint: &ServiceEndpoint,
    ) -> Result<(Value, String), McpError> {
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let limit = self.config.max_response_bytes;

        if let Some(len) = response.content_length()
            && len as usize > limit
        {
            tracing::warn!(
                service = %endpoint.name,
                content_length = len,
                max = limit,
                "Rejected tool response: Content-Length exceeds limit"
            );
            return Err(McpError::ResponseTooLarge {
                service: endpoint.name.clone(),
                limit,
            });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&e))?;
            if body.len() + chunk.len() > limit {
                return Err(McpError::ResponseTooLarge {
                    service: endpoint.name.clone(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&body).into_owned();

        if !status.is_success() {
            return Err(McpError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()))
        };
        Ok((value, text))
    }
}

impl std::fmt::Debug for McpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpAdapter")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

fn parse_tool_list(service: &str, body: Value) -> Result<Vec<ToolDefinition>, McpError> {
    let parsed = match body {
        Value::Array(_) => serde_json::from_value::<Vec<ToolDefinition>>(body),
        other => serde_json::from_value::<ToolListResponse>(other).map(|r| r.tools),
    };
    parsed.map_err(|e| McpError::InvalidResponse {
        service: service.to_string(),
        reason: format!("malformed tool list: {}", e),
    })
}

/// Fill `${VAR}` placeholders in the endpoint's header templates.
///
/// Values come from the call-time environment first, then from fixed
/// (non-empty) entries of the endpoint's env template. A header with an
/// unresolved placeholder is dropped.
pub(crate) fn render_headers(
    endpoint: &ServiceEndpoint,
    env: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let lookup = |var: &str| -> Option<String> {
        env.get(var)
            .filter(|v| !v.is_empty())
            .or_else(|| endpoint.env.get(var).filter(|v| !v.is_empty()))
            .cloned()
    };

    let mut out = Vec::with_capacity(endpoint.headers.len());
    for (name, template) in &endpoint.headers {
        let mut missing = Vec::new();
        let value = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| {
                missing.push(caps[1].to_string());
                String::new()
            })
        });
        if missing.is_empty() {
            out.push((name.clone(), value.into_owned()));
        } else {
            tracing::warn!(
                service = %endpoint.name,
                header = %name,
                "Dropping header with unresolved placeholders: {}",
                missing.join(", ")
            );
        }
    }
    out
}

/// Map a reqwest failure to a transport error, keeping the source chain in
/// the message so classification can see e.g. "Connection refused".
fn transport_error(e: &reqwest::Error) -> McpError {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }

    let lower = message.to_lowercase();
    let kind = if e.is_timeout() {
        TransportKind::Timeout
    } else if lower.contains("dns error") || lower.contains("failed to lookup address") {
        TransportKind::Dns
    } else if e.is_connect() {
        TransportKind::Connect
    } else {
        TransportKind::Other
    };

    McpError::Transport { kind, message }
}
