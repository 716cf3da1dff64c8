//! Envelope encryption of credential payloads.
//!
//! Payload layout: `base64(salt[32] || nonce[12] || ciphertext)`. A fresh salt
//! per record feeds HKDF-SHA256 together with the master key; the derived key
//! drives AES-256-GCM over a JSON object of string fields.

use std::collections::{BTreeMap, HashMap};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::config::MIN_MASTER_KEY_LEN;
use crate::error::CredentialError;

const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const KEY_INFO: &[u8] = b"stepchain-credentials-v1";

/// Encrypts and decrypts credential payloads with a master key.
pub struct SecretsCrypto {
    master_key: SecretString,
}

impl SecretsCrypto {
    pub fn new(master_key: SecretString) -> Result<Self, CredentialError> {
        if master_key.expose_secret().len() < MIN_MASTER_KEY_LEN {
            return Err(CredentialError::Store(format!(
                "master key must be at least {MIN_MASTER_KEY_LEN} bytes"
            )));
        }
        Ok(Self { master_key })
    }

    fn cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, String> {
        let hk = Hkdf::<Sha256>::new(Some(salt), self.master_key.expose_secret().as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|e| format!("key derivation failed: {e}"))?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| format!("invalid derived key: {e}"))
    }

    /// Encrypt a set of credential fields into a stored payload.
    pub fn encrypt_fields(&self, fields: &BTreeMap<String, String>) -> Result<String, CredentialError> {
        let plaintext =
            serde_json::to_vec(fields).map_err(|e| CredentialError::Store(e.to_string()))?;

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = self.cipher(&salt).map_err(CredentialError::Store)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| CredentialError::Store(format!("failed to encrypt payload: {e}")))?;

        let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a stored payload. Values come back wrapped in `SecretString`.
    pub fn decrypt_fields(
        &self,
        service: &str,
        payload: &str,
    ) -> Result<HashMap<String, SecretString>, CredentialError> {
        let fail = |reason: String| CredentialError::Decryption {
            service: service.to_string(),
            reason,
        };

        let raw = STANDARD
            .decode(payload.trim())
            .map_err(|e| fail(format!("payload is not base64: {e}")))?;
        if raw.len() <= SALT_SIZE + NONCE_SIZE {
            return Err(fail("payload is too short".to_string()));
        }

        let (salt, rest) = raw.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
        let cipher = self.cipher(salt).map_err(fail)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| fail("authentication tag mismatch (wrong key or tampered data)".to_string()))?;

        let value: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| fail(format!("payload is not JSON: {e}")))?;
        let serde_json::Value::Object(map) = value else {
            return Err(fail("payload is not a JSON object".to_string()));
        };

        let mut fields = HashMap::with_capacity(map.len());
        for (key, value) in map {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => continue,
                other @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => {
                    other.to_string()
                }
                _ => {
                    tracing::debug!(service, field = %key, "Skipping non-scalar credential field");
                    continue;
                }
            };
            fields.insert(key, SecretString::from(text));
        }
        Ok(fields)
    }
}

impl std::fmt::Debug for SecretsCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsCrypto").finish_non_exhaustive()
    }
}
