//! `stepchain run`: execute a plan file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use futures::StreamExt;
use serde::Deserialize;

use crate::config::Config;
use crate::events::ProgressStreamer;
use crate::secrets::{CredentialRecord, CredentialResolver, InMemoryCredentialStore, SecretsCrypto};
use crate::tools::McpToolRuntime;
use crate::tools::mcp::{McpAdapter, ServiceRegistry};
use crate::workflow::{ChainRunner, RunRequest, WorkflowStep};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Plan file: a JSON array of steps, or an object with a `steps` array
    #[arg(short, long)]
    pub plan: PathBuf,

    /// User the plan runs on behalf of
    #[arg(short, long, env = "STEPCHAIN_USER")]
    pub user: String,

    /// Task id (a random UUID when omitted)
    #[arg(long)]
    pub task_id: Option<String>,

    /// Conversation the task belongs to
    #[arg(long)]
    pub conversation: Option<String>,

    /// Credential records (JSON array) to load before running
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Steps(Vec<WorkflowStep>),
    Wrapped { steps: Vec<WorkflowStep> },
}

fn load_plan(path: &Path) -> anyhow::Result<Vec<WorkflowStep>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let plan: PlanFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid plan file {}", path.display()))?;
    Ok(match plan {
        PlanFile::Steps(steps) | PlanFile::Wrapped { steps } => steps,
    })
}

fn load_credentials(path: &Path) -> anyhow::Result<Vec<CredentialRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid credentials file {}", path.display()))
}

/// Run a plan, printing one JSON progress event per line on stdout.
///
/// Returns whether every step succeeded.
pub async fn run_plan_command(args: RunArgs, config: &Config) -> anyhow::Result<bool> {
    let steps = load_plan(&args.plan)?;

    let registry = Arc::new(ServiceRegistry::from_endpoints(
        config.services.services.iter().cloned(),
    ));
    tracing::info!(services = registry.count(), "Tool service registry ready");
    let adapter = McpAdapter::new(registry, config.adapter.clone())?;

    let store = Arc::new(InMemoryCredentialStore::new());
    if let Some(path) = &args.credentials {
        let records = load_credentials(path)?;
        tracing::info!(count = records.len(), "Loaded credential records");
        for record in records {
            store.insert(record);
        }
    }
    let crypto = match config.secrets.master_key() {
        Some(key) => Some(Arc::new(SecretsCrypto::new(key.clone())?)),
        None => {
            tracing::debug!("SECRETS_MASTER_KEY not set, stored credentials cannot be decrypted");
            None
        }
    };
    let resolver = Arc::new(CredentialResolver::new(store, crypto));

    let runner = ChainRunner::new(Arc::new(McpToolRuntime::new(adapter)))
        .with_credentials(resolver)
        .with_config(config.runner.clone());

    let streamer = ProgressStreamer::new();
    let mut events = streamer
        .subscribe()
        .context("progress stream already taken")?;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to serialize progress event: {}", e),
            }
        }
    });

    let mut request = RunRequest::new(
        args.task_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        args.user,
        steps,
    );
    if let Some(conversation) = args.conversation {
        request = request.with_conversation(conversation);
    }

    let outcome = runner.run(request, &streamer).await;
    // Closing the channel lets the printer drain and exit.
    drop(streamer);
    printer.await.context("event printer panicked")?;

    Ok(outcome?.success)
}
