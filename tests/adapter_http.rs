//! HTTP adapter behaviour against a mock tool service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stepchain::classifier::{ErrorClassifier, ErrorKind};
use stepchain::config::AdapterConfig;
use stepchain::error::{McpError, ToolError, TransportKind};
use stepchain::tools::mcp::{McpAdapter, RetryPolicy, ServiceEndpoint, ServiceRegistry};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(endpoints: Vec<ServiceEndpoint>) -> McpAdapter {
    let config = AdapterConfig {
        call_timeout: Duration::from_secs(2),
        retry: RetryPolicy::immediate(3),
        ..AdapterConfig::default()
    };
    McpAdapter::new(Arc::new(ServiceRegistry::from_endpoints(endpoints)), config).unwrap()
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

#[tokio::test]
async fn tool_catalog_is_cached_until_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tools": [
                {
                    "name": "get_price",
                    "description": "Current price",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"symbol": {"type": "string"}},
                        "required": ["symbol"]
                    }
                },
                {"name": "list_coins"}
            ]
        })))
        .mount(&server)
        .await;

    let adapter = adapter_for(vec![ServiceEndpoint::new("Crypto", server.uri())]);

    let tools = adapter.list_tools("crypto").await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "get_price");
    assert_eq!(tools[0].input_schema["required"], json!(["symbol"]));

    adapter.list_tools("CRYPTO").await.unwrap();
    assert_eq!(requests_to(&server, "/tools").await, 1);

    adapter.clear_cache();
    adapter.list_tools("crypto").await.unwrap();
    assert_eq!(requests_to(&server, "/tools").await, 2);
}

#[tokio::test]
async fn invoke_posts_name_and_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .and(body_json(json!({"name": "get_price", "arguments": {"symbol": "BTC"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "{\"price\": 65000}"}],
            "isError": false
        })))
        .mount(&server)
        .await;

    let adapter = adapter_for(vec![ServiceEndpoint::new("crypto", server.uri())]);
    let result = adapter
        .invoke("crypto", "get_price", &json!({"symbol": "BTC"}))
        .await
        .unwrap();

    assert_eq!(result.content, json!({"price": 65000}));
    assert_eq!(result.attempts, 1);
    assert!(result.raw.is_some());
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "invalid api key"}})),
        )
        .mount(&server)
        .await;

    let adapter = adapter_for(vec![ServiceEndpoint::new("github", server.uri())]);
    let err = adapter
        .invoke("github", "list_repos", &json!({}))
        .await
        .unwrap_err();

    match &err {
        McpError::Http { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "invalid api key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(requests_to(&server, "/tools/call").await, 1);

    let classified = ErrorClassifier::new().classify_tool_error(&ToolError::from(err), Some("github"));
    assert_eq!(classified.kind, ErrorKind::InvalidApiKey);
    assert!(!classified.retryable);
}

#[tokio::test]
async fn tool_reported_error_becomes_tool_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Rate limit exceeded, try again later"}],
            "isError": true
        })))
        .mount(&server)
        .await;

    let adapter = adapter_for(vec![ServiceEndpoint::new("search", server.uri())]);
    let err = adapter
        .invoke("search", "web_search", &json!({"q": "rust"}))
        .await
        .unwrap_err();

    assert!(matches!(err, McpError::ToolFailed { ref tool, .. } if tool == "web_search"));
    let classified = ErrorClassifier::new().classify_tool_error(&ToolError::from(err), Some("search"));
    assert_eq!(classified.kind, ErrorKind::RateLimited);
    assert_eq!(classified.backoff_hint, Some(60));
}

#[tokio::test]
async fn headers_are_rendered_from_call_env() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .and(header("authorization", "Bearer tok-123"))
        .and(header("x-region", "eu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let endpoint = ServiceEndpoint::new("github", server.uri())
        .with_auth([("GITHUB_TOKEN", ""), ("REGION", "eu")])
        .with_header("Authorization", "Bearer ${GITHUB_TOKEN}")
        .with_header("X-Region", "${REGION}");
    let adapter = adapter_for(vec![endpoint]);

    let env = HashMap::from([("GITHUB_TOKEN".to_string(), "tok-123".to_string())]);
    let result = adapter
        .invoke_with_env("github", "whoami", &json!({}), &env)
        .await
        .unwrap();
    assert_eq!(result.content, json!({"ok": true}));
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let config = AdapterConfig {
        max_response_bytes: 1024,
        retry: RetryPolicy::immediate(1),
        ..AdapterConfig::default()
    };
    let adapter = McpAdapter::new(
        Arc::new(ServiceRegistry::from_endpoints([ServiceEndpoint::new(
            "big",
            server.uri(),
        )])),
        config,
    )
    .unwrap();

    let err = adapter.invoke("big", "dump", &json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ResponseTooLarge { limit: 1024, .. }));
}

#[tokio::test]
async fn refused_connection_exhausts_retries() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let adapter = adapter_for(vec![ServiceEndpoint::new(
        "offline",
        format!("http://127.0.0.1:{port}"),
    )]);

    let err = adapter
        .invoke("offline", "ping", &json!({}))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(
        err,
        McpError::Transport {
            kind: TransportKind::Connect,
            ..
        }
    ));

    let classified = ErrorClassifier::new().classify_tool_error(&ToolError::from(err), Some("offline"));
    assert_eq!(classified.kind, ErrorKind::ConnectionRefused);
    assert!(classified.retryable);
}

#[tokio::test]
async fn unknown_service_is_rejected_without_network() {
    let adapter = adapter_for(vec![]);
    let err = adapter.invoke("ghost", "anything", &json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ServiceNotFound { ref name } if name == "ghost"));
}
