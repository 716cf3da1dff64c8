//! `stepchain credential`: produce encrypted credential records.

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Subcommand;

use crate::config::Config;
use crate::secrets::{CredentialRecord, SecretsCrypto};

#[derive(Subcommand, Debug, Clone)]
pub enum CredentialCommand {
    /// Encrypt credential fields into a JSON record
    Encrypt {
        /// User the credential belongs to
        #[arg(long)]
        user: String,

        /// Tool service the credential is for
        #[arg(long)]
        service: String,

        /// Mark the credential as verified
        #[arg(long)]
        verified: bool,

        /// Credential fields as KEY=VALUE
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Run a credential command.
pub async fn run_credential_command(cmd: CredentialCommand, config: &Config) -> anyhow::Result<()> {
    match cmd {
        CredentialCommand::Encrypt {
            user,
            service,
            verified,
            fields,
        } => {
            let key = config
                .secrets
                .master_key()
                .context("SECRETS_MASTER_KEY must be set to encrypt credentials")?;
            let crypto = SecretsCrypto::new(key.clone())?;
            let fields: BTreeMap<String, String> = fields.into_iter().collect();

            let record = CredentialRecord {
                user_id: user,
                tool_name: service,
                encrypted_payload: crypto.encrypt_fields(&fields)?,
                verified,
            };
            println!("{}", serde_json::to_string(&record)?);
            Ok(())
        }
    }
}
