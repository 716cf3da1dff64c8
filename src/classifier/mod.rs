//! Failure classification.
//!
//! Every failure a step can hit is mapped onto a closed set of
//! [`ErrorKind`]s with retryability and user guidance attached.
//! Classification is a pure function of `(message, stack, tool_name)`;
//! optional enrichment only ever adds `details`.

mod enrich;
mod rules;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, McpError, ToolError, TransportKind};

pub use enrich::ErrorEnricher;

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidApiKey,
    ExpiredApiKey,
    WrongPassword,
    Unauthorized,
    InsufficientPermissions,
    AuthRequired,
    ConnectionTimeout,
    ConnectionRefused,
    DnsResolutionFailed,
    NetworkError,
    MissingDependency,
    InvalidCommand,
    PermissionDenied,
    ServiceNotFound,
    InvalidArguments,
    ConfigurationError,
    ServerError,
    RateLimited,
    QuotaExceeded,
    Unknown,
}

/// Coarse grouping of [`ErrorKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Connection,
    Configuration,
    Server,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::ExpiredApiKey => "EXPIRED_API_KEY",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ServiceNotFound => "SERVICE_NOT_FOUND",
            Self::InvalidArguments => "INVALID_ARGUMENTS",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidApiKey
            | Self::ExpiredApiKey
            | Self::WrongPassword
            | Self::Unauthorized
            | Self::InsufficientPermissions
            | Self::AuthRequired => ErrorCategory::Authentication,
            Self::ConnectionTimeout
            | Self::ConnectionRefused
            | Self::DnsResolutionFailed
            | Self::NetworkError => ErrorCategory::Connection,
            Self::MissingDependency
            | Self::InvalidCommand
            | Self::PermissionDenied
            | Self::ServiceNotFound
            | Self::InvalidArguments
            | Self::ConfigurationError => ErrorCategory::Configuration,
            Self::ServerError | Self::RateLimited | Self::QuotaExceeded => ErrorCategory::Server,
            Self::Unknown => ErrorCategory::Unknown,
        }
    }

    /// Connection and server failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Server
        )
    }

    /// Authentication failures need the user to (re)link credentials.
    pub fn requires_user_action(&self) -> bool {
        self.category() == ErrorCategory::Authentication
    }

    /// Suggested wait before retrying, for kinds that warrant a long pause.
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited => Some(Duration::from_secs(60)),
            Self::QuotaExceeded => Some(Duration::from_secs(3600)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure mapped onto the taxonomy, with guidance for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    /// The original failure text.
    pub message: String,
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub retryable: bool,
    pub requires_user_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Suggested wait in seconds before trying again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_hint: Option<u64>,
    /// Best-effort extra explanation from an [`ErrorEnricher`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ClassifiedError {
    /// Build the classification for a known kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>, tool_name: Option<&str>) -> Self {
        let (user_message, suggestions) = guidance(kind, tool_name);
        Self {
            kind,
            category: kind.category(),
            message: message.into(),
            user_message,
            suggestions,
            retryable: kind.is_retryable(),
            requires_user_action: kind.requires_user_action(),
            tool_name: tool_name.map(str::to_string),
            backoff_hint: kind.backoff_hint().map(|d| d.as_secs()),
            details: None,
        }
    }
}

fn guidance(kind: ErrorKind, tool: Option<&str>) -> (String, Vec<String>) {
    let name = tool.unwrap_or("this tool");
    let (message, suggestions): (String, &[&str]) = match kind {
        ErrorKind::InvalidApiKey => (
            format!("Your API key for {name} was rejected."),
            &[
                "Check that the key was copied completely",
                "Generate a new key and link it again",
            ],
        ),
        ErrorKind::ExpiredApiKey => (
            format!("Your credentials for {name} have expired."),
            &["Renew the key or token and link it again"],
        ),
        ErrorKind::WrongPassword => (
            format!("The username or password for {name} is incorrect."),
            &["Re-enter your login details"],
        ),
        ErrorKind::Unauthorized => (
            format!("Your credentials for {name} were rejected."),
            &[
                "Reconnect the tool with valid credentials",
                "Check that the account is still active",
            ],
        ),
        ErrorKind::InsufficientPermissions => (
            format!("Your account for {name} lacks the permissions this action needs."),
            &[
                "Grant the missing scopes or permissions",
                "Use an account with access to the resource",
            ],
        ),
        ErrorKind::AuthRequired => (
            format!("{name} needs to be connected to your account before it can run."),
            &["Link your credentials for this tool and try again"],
        ),
        ErrorKind::ConnectionTimeout => (
            format!("{name} did not respond in time."),
            &["Try again in a moment", "The service may be under heavy load"],
        ),
        ErrorKind::ConnectionRefused => (
            format!("Could not connect to {name}."),
            &["Check that the service is running", "Try again in a moment"],
        ),
        ErrorKind::DnsResolutionFailed => (
            format!("The address of {name} could not be resolved."),
            &["Check the service URL", "Check network connectivity"],
        ),
        ErrorKind::NetworkError => (
            format!("A network error interrupted the call to {name}."),
            &["Try again in a moment"],
        ),
        ErrorKind::MissingDependency => (
            format!("{name} is missing a required component."),
            &["Ask an administrator to install the missing dependency"],
        ),
        ErrorKind::InvalidCommand => (
            format!("{name} was started with an invalid command."),
            &["Ask an administrator to check the service configuration"],
        ),
        ErrorKind::PermissionDenied => (
            format!("{name} was denied access to a local resource."),
            &["Ask an administrator to check file and process permissions"],
        ),
        ErrorKind::ServiceNotFound => (
            format!("{name} is not available on this platform."),
            &[
                "Check the tool name in the plan",
                "Ask an administrator to register the service",
            ],
        ),
        ErrorKind::InvalidArguments => (
            format!("{name} rejected the arguments it was given."),
            &["Rephrase the request with the required details"],
        ),
        ErrorKind::ConfigurationError => (
            format!("{name} is not configured correctly."),
            &["Ask an administrator to review the service configuration"],
        ),
        ErrorKind::ServerError => (
            format!("{name} had an internal error."),
            &["Try again later"],
        ),
        ErrorKind::RateLimited => (
            format!("{name} is receiving too many requests."),
            &["Wait a minute before trying again"],
        ),
        ErrorKind::QuotaExceeded => (
            format!("Your usage quota for {name} is exhausted."),
            &[
                "Wait for the quota to reset",
                "Upgrade the plan with the provider",
            ],
        ),
        ErrorKind::Unknown => (
            format!("Something went wrong while running {name}."),
            &["Try again", "Contact support if the problem persists"],
        ),
    };
    (
        capitalize(&message),
        suggestions.iter().map(|s| s.to_string()).collect(),
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Maps failures onto [`ClassifiedError`].
#[derive(Clone)]
pub struct ErrorClassifier {
    enricher: Option<Arc<dyn ErrorEnricher>>,
    enrich_timeout: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            enricher: None,
            enrich_timeout: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("enricher", &self.enricher.is_some())
            .field("enrich_timeout", &self.enrich_timeout)
            .finish()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a best-effort enricher bounded by `timeout`.
    pub fn with_enricher(mut self, enricher: Arc<dyn ErrorEnricher>, timeout: Duration) -> Self {
        self.enricher = Some(enricher);
        self.enrich_timeout = timeout;
        self
    }

    /// Change the enrichment bound, keeping any attached enricher.
    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }

    /// Classify raw failure text. Pure: same input, same output.
    pub fn classify(
        &self,
        message: &str,
        stack: Option<&str>,
        tool_name: Option<&str>,
    ) -> ClassifiedError {
        let kind = match stack {
            Some(stack) if !stack.is_empty() => rules::match_text(message)
                .or_else(|| rules::match_text(stack)),
            _ => rules::match_text(message),
        }
        .unwrap_or(ErrorKind::Unknown);
        ClassifiedError::new(kind, message, tool_name)
    }

    /// Classify a structured step failure, using its type where it is
    /// unambiguous and the text patterns otherwise.
    pub fn classify_tool_error(&self, error: &ToolError, tool_name: Option<&str>) -> ClassifiedError {
        let message = error.to_string();
        let kind = match error {
            ToolError::Mcp(e) => mcp_kind(e),
            ToolError::Credential(e) => credential_kind(e),
        };
        match kind {
            Some(kind) => ClassifiedError::new(kind, message, tool_name),
            None => self.classify(&message, None, tool_name),
        }
    }

    /// Attach enricher output to `details`. Never changes kind or
    /// retryability; failures and timeouts are swallowed.
    pub async fn enrich(&self, error: ClassifiedError) -> ClassifiedError {
        match &self.enricher {
            Some(enricher) => enrich::enrich_bounded(enricher.as_ref(), error, self.enrich_timeout).await,
            None => error,
        }
    }
}

fn mcp_kind(error: &McpError) -> Option<ErrorKind> {
    match error {
        McpError::ServiceNotFound { .. } => Some(ErrorKind::ServiceNotFound),
        McpError::InvalidArguments { .. } => Some(ErrorKind::InvalidArguments),
        McpError::Transport { kind, message } => Some(match kind {
            TransportKind::Timeout => ErrorKind::ConnectionTimeout,
            TransportKind::Dns => ErrorKind::DnsResolutionFailed,
            TransportKind::Connect if message.to_lowercase().contains("refused") => {
                ErrorKind::ConnectionRefused
            }
            TransportKind::Connect | TransportKind::Other => ErrorKind::NetworkError,
        }),
        McpError::Http { status, message } => {
            rules::match_text(&format!("HTTP {status}: {message}")).or(match status {
                400 | 422 => Some(ErrorKind::InvalidArguments),
                401 => Some(ErrorKind::Unauthorized),
                403 => Some(ErrorKind::InsufficientPermissions),
                404 => Some(ErrorKind::ConfigurationError),
                429 => Some(ErrorKind::RateLimited),
                500..=599 => Some(ErrorKind::ServerError),
                _ => None,
            })
        }
        McpError::InvalidResponse { .. } => Some(ErrorKind::ServerError),
        McpError::ResponseTooLarge { .. } | McpError::Client(_) => {
            Some(ErrorKind::ConfigurationError)
        }
        McpError::ToolFailed { .. } => None,
    }
}

fn credential_kind(error: &CredentialError) -> Option<ErrorKind> {
    match error {
        CredentialError::AuthRequired { .. }
        | CredentialError::NotVerified { .. }
        | CredentialError::Decryption { .. } => Some(ErrorKind::AuthRequired),
        CredentialError::MasterKeyMissing => Some(ErrorKind::ConfigurationError),
        CredentialError::Store(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::InvalidApiKey).unwrap(),
            serde_json::json!("INVALID_API_KEY")
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::DnsResolutionFailed).unwrap(),
            serde_json::json!(ErrorKind::DnsResolutionFailed.as_str())
        );
    }

    #[test]
    fn test_classification_is_pure() {
        let classifier = ErrorClassifier::new();
        let a = classifier.classify("Connection refused (os error 111)", None, Some("github"));
        let b = classifier.classify("Connection refused (os error 111)", None, Some("github"));
        assert_eq!(a, b);
        assert_eq!(a.kind, ErrorKind::ConnectionRefused);
        assert!(a.retryable);
        assert!(!a.requires_user_action);
    }

    #[test]
    fn test_auth_beats_connection() {
        let classifier = ErrorClassifier::new();
        let err = classifier.classify("401 Unauthorized after connection reset", None, None);
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.category, ErrorCategory::Authentication);
        assert!(!err.retryable);
        assert!(err.requires_user_action);
    }

    #[test]
    fn test_stack_is_consulted_when_message_is_vague() {
        let classifier = ErrorClassifier::new();
        let err = classifier.classify(
            "tool crashed",
            Some("Error: ENOENT: no such file\n  at spawn (node:child_process)"),
            None,
        );
        assert_eq!(err.kind, ErrorKind::MissingDependency);
        assert!(!err.retryable);
    }

    #[test]
    fn test_rate_limit_has_long_backoff() {
        let err = ErrorClassifier::new().classify("429 Too Many Requests", None, None);
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert!(err.retryable);
        assert_eq!(err.backoff_hint, Some(60));
    }

    #[test]
    fn test_unknown_is_not_retryable() {
        let err = ErrorClassifier::new().classify("the frobnicator broke", None, None);
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
        assert!(!err.suggestions.is_empty());
    }

    #[test]
    fn test_user_message_names_tool() {
        let err = ErrorClassifier::new().classify("HTTP 401: invalid api key", None, Some("github"));
        assert_eq!(err.kind, ErrorKind::InvalidApiKey);
        assert_eq!(err.user_message, "Your API key for github was rejected.");
        assert_eq!(err.tool_name.as_deref(), Some("github"));

        let anonymous = ErrorClassifier::new().classify("HTTP 500", None, None);
        assert_eq!(anonymous.user_message, "This tool had an internal error.");
    }

    #[test]
    fn test_typed_shortcuts() {
        let classifier = ErrorClassifier::new();

        let not_found = classifier.classify_tool_error(
            &McpError::ServiceNotFound {
                name: "nonexistent-tool".to_string(),
            }
            .into(),
            Some("nonexistent-tool"),
        );
        assert_eq!(not_found.kind, ErrorKind::ServiceNotFound);
        assert!(!not_found.retryable);

        let auth = classifier.classify_tool_error(
            &CredentialError::NotVerified {
                service: "github".to_string(),
            }
            .into(),
            Some("github"),
        );
        assert_eq!(auth.kind, ErrorKind::AuthRequired);
        assert!(auth.requires_user_action);

        let args = classifier.classify_tool_error(
            &McpError::InvalidArguments {
                tool: "get_price".to_string(),
                errors: vec!["arguments.symbol: missing required field".to_string()],
            }
            .into(),
            None,
        );
        assert_eq!(args.kind, ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_transport_kinds() {
        let classifier = ErrorClassifier::new();
        let timeout = classifier.classify_tool_error(
            &McpError::Transport {
                kind: TransportKind::Timeout,
                message: "error sending request: operation timed out".to_string(),
            }
            .into(),
            None,
        );
        assert_eq!(timeout.kind, ErrorKind::ConnectionTimeout);

        let refused = classifier.classify_tool_error(
            &McpError::Transport {
                kind: TransportKind::Connect,
                message: "tcp connect error: Connection refused (os error 111)".to_string(),
            }
            .into(),
            None,
        );
        assert_eq!(refused.kind, ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_http_status_fallbacks() {
        let classifier = ErrorClassifier::new();
        let classify = |status: u16, message: &str| {
            classifier
                .classify_tool_error(
                    &McpError::Http {
                        status,
                        message: message.to_string(),
                    }
                    .into(),
                    None,
                )
                .kind
        };

        assert_eq!(classify(401, "invalid api key"), ErrorKind::InvalidApiKey);
        assert_eq!(classify(401, "nope"), ErrorKind::Unauthorized);
        assert_eq!(classify(404, "Not Found"), ErrorKind::ConfigurationError);
        assert_eq!(classify(422, "symbol is required"), ErrorKind::InvalidArguments);
        assert_eq!(classify(503, "try later"), ErrorKind::ServerError);
        assert_eq!(classify(418, "teapot"), ErrorKind::Unknown);
    }

    #[test]
    fn test_tool_failed_uses_text() {
        let err = ErrorClassifier::new().classify_tool_error(
            &McpError::ToolFailed {
                tool: "list_repos".to_string(),
                message: "Bad credentials".to_string(),
            }
            .into(),
            Some("github"),
        );
        assert_eq!(err.kind, ErrorKind::InvalidApiKey);
    }
}
