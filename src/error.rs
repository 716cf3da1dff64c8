//! Error types for the execution engine.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool service error: {0}")]
    Mcp(#[from] McpError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Which part of the network stack a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The request did not complete within the call timeout.
    Timeout,
    /// The TCP connection could not be established.
    Connect,
    /// The host name could not be resolved.
    Dns,
    /// Any other failure before a response status was received.
    Other,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Request timed out"),
            Self::Connect => write!(f, "Connection failed"),
            Self::Dns => write!(f, "DNS resolution failed"),
            Self::Other => write!(f, "Network error"),
        }
    }
}

/// Errors raised by the tool-service adapter.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Service not found: '{name}' is not registered")]
    ServiceNotFound { name: String },

    #[error("{kind}: {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Invalid response from '{service}': {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Response from '{service}' exceeds maximum allowed size ({limit} bytes)")]
    ResponseTooLarge { service: String, limit: usize },

    #[error("Invalid arguments for '{tool}': {}", errors.join("; "))]
    InvalidArguments { tool: String, errors: Vec<String> },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl McpError {
    /// Whether the adapter may retry this failure on its own.
    ///
    /// Only transport failures qualify. HTTP error statuses and tool-level
    /// errors are surfaced to the caller untouched.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Errors raised while resolving per-user credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Authentication required: no credentials linked for '{service}'")]
    AuthRequired { service: String },

    #[error("Authentication required: credentials for '{service}' are not verified")]
    NotVerified { service: String },

    #[error("Failed to decrypt credentials for '{service}': {reason}")]
    Decryption { service: String, reason: String },

    #[error("Secrets master key is not configured")]
    MasterKeyMissing,

    #[error("Credential store error: {0}")]
    Store(String),
}

/// A step-level failure as the chain runner sees it.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Precondition violations on an incoming plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Plan has no steps")]
    Empty,

    #[error("Step numbers must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguous { expected: u32, found: u32 },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
