//! Per-user credential resolution and call-time env injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;
use crate::secrets::crypto::SecretsCrypto;
use crate::secrets::store::CredentialStore;
use crate::tools::mcp::ServiceEndpoint;

/// Decrypted credential fields. Values never appear in `Debug` output.
pub struct ResolvedCredential {
    fields: HashMap<String, SecretString>,
    pub verified: bool,
}

impl ResolvedCredential {
    pub fn new(fields: HashMap<String, SecretString>, verified: bool) -> Self {
        Self { fields, verified }
    }

    /// Field names, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find a field whose normalized name equals `normalized`.
    fn find(&self, normalized: &str) -> Option<&SecretString> {
        self.fields
            .iter()
            .find(|(k, _)| normalize_key(k) == normalized)
            .map(|(_, v)| v)
    }

    /// Plaintext values, for scrubbing tool output.
    pub(crate) fn secret_values(&self) -> Vec<String> {
        self.fields
            .values()
            .map(|v| v.expose_secret().to_string())
            .collect()
    }
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("fields", &self.field_names())
            .field("verified", &self.verified)
            .finish()
    }
}

/// Lowercase with `-` and `_` stripped.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Alternative credential field names for env template keys.
#[derive(Debug, Clone)]
pub struct AliasTable {
    groups: Vec<(String, Vec<String>)>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let mut table = Self { groups: Vec::new() };
        table.add("API_KEY", ["apiKey", "api_key", "key", "token"]);
        table.add("TOKEN", ["token", "accessToken", "access_token", "api_key"]);
        table.add("ACCESS_TOKEN", ["token", "accessToken", "access_token", "api_key"]);
        table.add("PASSWORD", ["password", "pass", "secret"]);
        table.add("USERNAME", ["username", "user", "login"]);
        table.add("CLIENT_SECRET", ["client_secret", "secret"]);
        table
    }
}

impl AliasTable {
    /// An empty table (direct key matches only).
    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    /// Add aliases for a template key. Extends an existing entry.
    pub fn add<I, S>(&mut self, key: &str, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = normalize_key(key);
        let aliases: Vec<String> = aliases.into_iter().map(|a| normalize_key(a.as_ref())).collect();
        match self.groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                for alias in aliases {
                    if !existing.contains(&alias) {
                        existing.push(alias);
                    }
                }
            }
            None => self.groups.push((key, aliases)),
        }
    }

    /// Builder form of [`add`](Self::add).
    pub fn with<I, S>(mut self, key: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add(key, aliases);
        self
    }

    fn aliases_of(&self, normalized: &str) -> &[String] {
        self.groups
            .iter()
            .find(|(k, _)| k == normalized)
            .map(|(_, a)| a.as_slice())
            .unwrap_or(&[])
    }

    /// Normalized field names to try for a template key, in priority order.
    ///
    /// `GITHUB_ACCESS_TOKEN` tries itself, then `ACCESS_TOKEN` and `TOKEN`
    /// together with their aliases.
    pub fn candidates(&self, key: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        };

        let segments: Vec<&str> = key.split(['_', '-']).filter(|s| !s.is_empty()).collect();
        for start in 0..segments.len() {
            let suffix = normalize_key(&segments[start..].concat());
            push(&suffix);
            for alias in self.aliases_of(&suffix) {
                push(alias);
            }
        }
        out
    }
}

/// Looks up and decrypts per-user credentials.
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    crypto: Option<Arc<SecretsCrypto>>,
    aliases: AliasTable,
}

impl CredentialResolver {
    /// Create a resolver. Without `crypto` any stored record fails to
    /// decrypt with `MasterKeyMissing`.
    pub fn new(store: Arc<dyn CredentialStore>, crypto: Option<Arc<SecretsCrypto>>) -> Self {
        Self {
            store,
            crypto,
            aliases: AliasTable::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Fetch and decrypt the user's credential for a service, if linked.
    pub async fn get_auth(
        &self,
        user_id: &str,
        mcp_name: &str,
    ) -> Result<Option<ResolvedCredential>, CredentialError> {
        let Some(record) = self.store.find(user_id, mcp_name).await? else {
            return Ok(None);
        };
        let crypto = self.crypto.as_ref().ok_or(CredentialError::MasterKeyMissing)?;
        let fields = crypto.decrypt_fields(mcp_name, &record.encrypted_payload)?;
        Ok(Some(ResolvedCredential::new(fields, record.verified)))
    }

    /// Like [`get_auth`](Self::get_auth) but a missing or unverified
    /// credential is an error.
    pub async fn require(
        &self,
        user_id: &str,
        mcp_name: &str,
    ) -> Result<ResolvedCredential, CredentialError> {
        match self.get_auth(user_id, mcp_name).await? {
            None => Err(CredentialError::AuthRequired {
                service: mcp_name.to_string(),
            }),
            Some(credential) if !credential.verified => Err(CredentialError::NotVerified {
                service: mcp_name.to_string(),
            }),
            Some(credential) => Ok(credential),
        }
    }

    /// Fill empty template values from the credential.
    ///
    /// Non-empty template values are fixed configuration and are never
    /// overwritten. An empty template exports every credential field under
    /// its own name.
    pub fn inject_env(
        &self,
        template: &BTreeMap<String, String>,
        credential: &ResolvedCredential,
    ) -> HashMap<String, String> {
        if template.is_empty() {
            return credential
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
                .collect();
        }

        let mut env = HashMap::with_capacity(template.len());
        for (key, configured) in template {
            if !configured.is_empty() {
                env.insert(key.clone(), configured.clone());
                continue;
            }
            let found = self
                .aliases
                .candidates(key)
                .iter()
                .find_map(|candidate| credential.find(candidate));
            match found {
                Some(value) => {
                    env.insert(key.clone(), value.expose_secret().to_string());
                }
                None => tracing::debug!(key = %key, "No credential field matches env key"),
            }
        }
        env
    }

    /// Call-time environment for a service.
    ///
    /// Returns the resolved env and the credential (when the service needs
    /// one). Fails before any network call when a required credential is
    /// missing, unverified or unreadable.
    pub async fn call_env(
        &self,
        user_id: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<(HashMap<String, String>, Option<ResolvedCredential>), CredentialError> {
        if !endpoint.requires_auth {
            let env = endpoint
                .env
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return Ok((env, None));
        }

        let credential = self.require(user_id, &endpoint.name).await?;
        let env = self.inject_env(&endpoint.env, &credential);
        Ok((env, Some(credential)))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("decryption", &self.crypto.is_some())
            .field("aliases", &self.aliases.groups.len())
            .finish()
    }
}
