//! Credential persistence seam.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;
use crate::tools::mcp::normalize_service_name;

/// A user's stored credential for one tool service. Read-only here.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: String,
    pub tool_name: String,
    /// `base64(salt || nonce || ciphertext)`, see [`SecretsCrypto`](super::SecretsCrypto).
    pub encrypted_payload: String,
    /// Whether the auth flow confirmed the credential works.
    #[serde(default)]
    pub verified: bool,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("tool_name", &self.tool_name)
            .field("encrypted_payload", &format!("<{} bytes>", self.encrypted_payload.len()))
            .field("verified", &self.verified)
            .finish()
    }
}

/// Lookup of credential records owned by the auth/persistence layer.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(
        &self,
        user_id: &str,
        tool_name: &str,
    ) -> Result<Option<CredentialRecord>, CredentialError>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<(String, String), CredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `(user_id, tool_name)`.
    pub fn insert(&self, record: CredentialRecord) {
        let key = (record.user_id.clone(), normalize_service_name(&record.tool_name));
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, record);
    }

    /// Remove a record (the user unlinked the tool).
    pub fn remove(&self, user_id: &str, tool_name: &str) -> Option<CredentialRecord> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(user_id.to_string(), normalize_service_name(tool_name)))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find(
        &self,
        user_id: &str,
        tool_name: &str,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id.to_string(), normalize_service_name(tool_name)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, tool: &str) -> CredentialRecord {
        CredentialRecord {
            user_id: user.to_string(),
            tool_name: tool.to_string(),
            encrypted_payload: "c2VjcmV0".to_string(),
            verified: true,
        }
    }

    #[tokio::test]
    async fn test_find_is_scoped_by_user_and_tool() {
        let store = InMemoryCredentialStore::new();
        store.insert(record("alice", "GitHub"));

        assert!(store.find("alice", "github").await.unwrap().is_some());
        assert!(store.find("bob", "github").await.unwrap().is_none());
        assert!(store.find("alice", "slack").await.unwrap().is_none());

        store.remove("alice", "github");
        assert!(store.find("alice", "github").await.unwrap().is_none());
    }

    #[test]
    fn test_debug_hides_payload() {
        let rendered = format!("{:?}", record("alice", "github"));
        assert!(!rendered.contains("c2VjcmV0"));
    }
}
