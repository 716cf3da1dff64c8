use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

/// Minimum master key length accepted for AES-256-GCM key derivation.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Credential decryption configuration.
#[derive(Clone, Default)]
pub struct SecretsConfig {
    /// Master key used to derive per-record credential keys.
    pub master_key: Option<SecretString>,
    /// Whether credential decryption is available.
    pub enabled: bool,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("master_key", &self.master_key.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SecretsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let master_key = optional_env("SECRETS_MASTER_KEY")?.map(SecretString::from);

        if let Some(ref key) = master_key
            && key.expose_secret().len() < MIN_MASTER_KEY_LEN
        {
            return Err(ConfigError::InvalidValue {
                key: "SECRETS_MASTER_KEY".to_string(),
                message: format!("must be at least {MIN_MASTER_KEY_LEN} bytes for AES-256-GCM"),
            });
        }

        Ok(Self {
            enabled: master_key.is_some(),
            master_key,
        })
    }

    /// Get the master key if configured.
    pub fn master_key(&self) -> Option<&SecretString> {
        self.master_key.as_ref()
    }
}
