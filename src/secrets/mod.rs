//! Per-user credentials for tool services.
//!
//! Records are owned by an external auth layer and reached through
//! [`CredentialStore`]. Payloads are decrypted with [`SecretsCrypto`] and
//! only leave this module as call-time environment values.

mod crypto;
mod resolver;
mod store;

pub use crypto::SecretsCrypto;
pub use resolver::{AliasTable, CredentialResolver, ResolvedCredential};
pub use store::{CredentialRecord, CredentialStore, InMemoryCredentialStore};
