//! The narrow interface the chain runner uses to reach tool services.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;
use crate::tools::mcp::{McpAdapter, ServiceEndpoint};
use crate::tools::schema_validator::translate_schema;
use crate::tools::tool::{ToolDefinition, ToolResult};

/// Per-call data the runner hands to the runtime.
#[derive(Clone, Default)]
pub struct CallContext {
    pub user_id: String,
    /// Resolved call-time environment (may hold credential values).
    pub env: HashMap<String, String>,
    /// Failure seen while discovering tools for this call. A transport
    /// failure counts against the invocation's retry budget.
    pub discovery_failure: Option<McpError>,
}

impl CallContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            env: HashMap::new(),
            discovery_failure: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_discovery_failure(mut self, error: McpError) -> Self {
        self.discovery_failure = Some(error);
        self
    }

    /// Transport attempts already spent before invoking.
    pub fn spent_attempts(&self) -> u32 {
        u32::from(self.discovery_failure.as_ref().is_some_and(McpError::is_transport))
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.env.keys().collect();
        keys.sort();
        f.debug_struct("CallContext")
            .field("user_id", &self.user_id)
            .field("env_keys", &keys)
            .field("discovery_failure", &self.discovery_failure)
            .finish()
    }
}

/// Tool the runner settled on for a step.
#[derive(Debug, Clone)]
pub struct SelectedTool {
    pub name: String,
    /// Definition from discovery, when the catalog was available.
    pub definition: Option<ToolDefinition>,
    /// Why discovery failed, when it did.
    pub discovery_error: Option<McpError>,
}

/// Runtime seam between the chain runner and tool services.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Look up a service; fails with `ServiceNotFound` when unregistered.
    fn resolve(&self, service: &str) -> Result<ServiceEndpoint, McpError>;

    /// Tools offered by a service. `ctx.env` authenticates the request.
    async fn list_tools(
        &self,
        service: &str,
        ctx: &CallContext,
    ) -> Result<Arc<Vec<ToolDefinition>>, McpError>;

    /// Invoke a tool.
    async fn invoke(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
        ctx: &CallContext,
    ) -> Result<ToolResult, McpError>;

    /// Canonical tool name for a free-form action.
    fn normalize_name(&self, action: &str) -> String {
        normalize_tool_name(action)
    }

    /// Coerce obvious mismatches, then validate against the tool's schema.
    fn normalize_input(&self, tool: &ToolDefinition, input: Value) -> Result<Value, McpError> {
        let validator = translate_schema(&tool.input_schema);
        let coerced = validator.coerce(input);
        let errors = validator.validate(&coerced, "arguments");
        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(McpError::InvalidArguments {
                tool: tool.name.clone(),
                errors,
            })
        }
    }

    /// Payload handed to data extraction and formatting.
    fn parse_result(&self, result: &ToolResult) -> Value {
        result.content.clone()
    }

    /// Map a step's action to a concrete tool of the service.
    ///
    /// Discovery failure is not fatal; the normalized action is used as is
    /// and the error is handed back for the invocation to account for.
    async fn select_tool(&self, service: &str, action: &str, ctx: &CallContext) -> SelectedTool {
        let normalized = self.normalize_name(action);
        match self.list_tools(service, ctx).await {
            Ok(catalog) => match select_tool(&catalog, action, &normalized) {
                Some(def) => SelectedTool {
                    name: def.name.clone(),
                    definition: Some(def.clone()),
                    discovery_error: None,
                },
                None => SelectedTool {
                    name: normalized,
                    definition: None,
                    discovery_error: None,
                },
            },
            Err(e) => {
                tracing::warn!(
                    service,
                    action,
                    "Tool discovery failed, using normalized action: {}",
                    e
                );
                SelectedTool {
                    name: normalized,
                    definition: None,
                    discovery_error: Some(e),
                }
            }
        }
    }
}

/// Lowercase, snake_case form of a tool or action name.
pub fn normalize_tool_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_' || c == '.') && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

const STOPWORDS: &[&str] = &["the", "a", "an", "of", "for", "to", "and", "in", "on", "my", "me"];

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Pick the catalog entry that best matches an action.
///
/// Exact normalized name first, then the highest token overlap (name tokens
/// weigh double), then the only tool of a one-tool service.
pub fn select_tool<'a>(
    catalog: &'a [ToolDefinition],
    action: &str,
    normalized: &str,
) -> Option<&'a ToolDefinition> {
    if let Some(exact) = catalog
        .iter()
        .find(|t| normalize_tool_name(&t.name) == normalized)
    {
        return Some(exact);
    }

    let wanted = tokens(action);
    let mut best: Option<(&ToolDefinition, usize)> = None;
    for tool in catalog {
        let name_hits = tokens(&tool.name).intersection(&wanted).count();
        let desc_hits = tokens(&tool.description).intersection(&wanted).count();
        let score = name_hits * 2 + desc_hits;
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((tool, score));
        }
    }
    if let Some((tool, _)) = best {
        return Some(tool);
    }

    match catalog {
        [only] => Some(only),
        _ => None,
    }
}

/// [`ToolRuntime`] over the HTTP adapter.
#[derive(Debug)]
pub struct McpToolRuntime {
    adapter: McpAdapter,
}

impl McpToolRuntime {
    pub fn new(adapter: McpAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &McpAdapter {
        &self.adapter
    }
}

#[async_trait]
impl ToolRuntime for McpToolRuntime {
    fn resolve(&self, service: &str) -> Result<ServiceEndpoint, McpError> {
        self.adapter.resolve(service)
    }

    async fn list_tools(
        &self,
        service: &str,
        ctx: &CallContext,
    ) -> Result<Arc<Vec<ToolDefinition>>, McpError> {
        self.adapter.list_tools_with_env(service, &ctx.env).await
    }

    /// A transport failure during discovery used up the first attempt; when
    /// that was the whole budget, it is the call's result.
    async fn invoke(
        &self,
        service: &str,
        tool: &str,
        arguments: &Value,
        ctx: &CallContext,
    ) -> Result<ToolResult, McpError> {
        let spent = ctx.spent_attempts();
        if let Some(error) = &ctx.discovery_failure
            && spent >= self.adapter.config().retry.max_attempts
        {
            return Err(error.clone());
        }
        self.adapter
            .invoke_after(service, tool, arguments, &ctx.env, spent)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("list_repositories", "List repositories for the user"),
            ToolDefinition::new("create_issue", "Open a new issue in a repository"),
            ToolDefinition::new("search_code", "Search code across repositories"),
        ]
    }

    #[test]
    fn test_normalize_tool_name() {
        assert_eq!(normalize_tool_name("Get Price"), "get_price");
        assert_eq!(normalize_tool_name("  list-repos  "), "list_repos");
        assert_eq!(normalize_tool_name("fetch__data!"), "fetch_data");
        assert_eq!(normalize_tool_name("search.web"), "search_web");
    }

    #[test]
    fn test_select_exact_match() {
        let tools = catalog();
        let picked = select_tool(&tools, "Create Issue", "create_issue").unwrap();
        assert_eq!(picked.name, "create_issue");
    }

    #[test]
    fn test_select_by_token_overlap() {
        let tools = catalog();
        let picked = select_tool(&tools, "search for code mentioning tokio", "search_for_code_mentioning_tokio")
            .unwrap();
        assert_eq!(picked.name, "search_code");

        let picked = select_tool(&tools, "show my repositories", "show_my_repositories").unwrap();
        assert_eq!(picked.name, "list_repositories");
    }

    #[test]
    fn test_select_single_tool_service() {
        let tools = vec![ToolDefinition::new("get_price", "Spot price")];
        let picked = select_tool(&tools, "what is bitcoin worth", "what_is_bitcoin_worth").unwrap();
        assert_eq!(picked.name, "get_price");
    }

    #[test]
    fn test_select_no_match() {
        let tools = catalog();
        assert!(select_tool(&tools, "delete everything", "delete_everything").is_none());
        assert!(select_tool(&[], "anything", "anything").is_none());
    }

    struct Catalogued;

    #[async_trait]
    impl ToolRuntime for Catalogued {
        fn resolve(&self, service: &str) -> Result<ServiceEndpoint, McpError> {
            Ok(ServiceEndpoint::new(service, "http://127.0.0.1:9"))
        }

        async fn list_tools(
            &self,
            _service: &str,
            _ctx: &CallContext,
        ) -> Result<Arc<Vec<ToolDefinition>>, McpError> {
            Ok(Arc::new(vec![ToolDefinition::new("get_price", "Spot price").with_schema(
                json!({
                    "type": "object",
                    "properties": { "amount": { "type": "number" } },
                    "required": ["amount"]
                }),
            )]))
        }

        async fn invoke(
            &self,
            _service: &str,
            _tool: &str,
            arguments: &Value,
            _ctx: &CallContext,
        ) -> Result<ToolResult, McpError> {
            Ok(ToolResult::success(arguments.clone(), std::time::Duration::ZERO))
        }
    }

    #[tokio::test]
    async fn test_default_select_and_normalize_input() {
        let runtime = Catalogued;
        let selected = runtime
            .select_tool("crypto", "Get Price", &CallContext::new("user-1"))
            .await;
        assert_eq!(selected.name, "get_price");
        assert!(selected.discovery_error.is_none());
        let def = selected.definition.unwrap();

        let input = runtime.normalize_input(&def, json!({"amount": "2.5"})).unwrap();
        assert_eq!(input, json!({"amount": 2.5}));

        let err = runtime.normalize_input(&def, json!({})).unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { ref errors, .. } if errors.len() == 1));
    }

    #[test]
    fn test_call_context_debug_hides_values() {
        let ctx = CallContext::new("user-1").with_env(HashMap::from([(
            "GITHUB_TOKEN".to_string(),
            "ghp_secret_value".to_string(),
        )]));
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("GITHUB_TOKEN"));
        assert!(!debug.contains("ghp_secret_value"));
    }

    #[test]
    fn test_only_transport_discovery_failures_spend_attempts() {
        let ctx = CallContext::new("user-1");
        assert_eq!(ctx.spent_attempts(), 0);

        let timed_out = ctx.clone().with_discovery_failure(McpError::Transport {
            kind: crate::error::TransportKind::Timeout,
            message: "operation timed out".to_string(),
        });
        assert_eq!(timed_out.spent_attempts(), 1);

        let rejected = ctx.with_discovery_failure(McpError::Http {
            status: 401,
            message: "Bad credentials".to_string(),
        });
        assert_eq!(rejected.spent_attempts(), 0);
    }
}
