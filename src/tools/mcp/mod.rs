//! Client side of the tool-service protocol.
//!
//! Services are registered in a [`ServiceRegistry`] by the wiring code and
//! reached through [`McpAdapter`], which handles discovery, invocation,
//! timeouts and transport retries.

mod client;
mod protocol;
mod registry;
mod retry;

pub use client::McpAdapter;
pub use registry::{ServiceEndpoint, ServiceRegistry, normalize_service_name};
pub use retry::{RetryPolicy, retry_transport, retry_transport_from};
