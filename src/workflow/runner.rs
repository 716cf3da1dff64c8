//! Sequential execution of a plan against the tool runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::Instrument;

use crate::classifier::{ErrorClassifier, ErrorEnricher};
use crate::config::RunnerConfig;
use crate::context::{ExecutionContext, ExecutionState, ExecutionSummary, StepResult};
use crate::error::{CredentialError, Error, ToolError};
use crate::events::{EventSink, ProgressEvent};
use crate::secrets::CredentialResolver;
use crate::tools::mcp::ServiceEndpoint;
use crate::tools::redaction::{redact_with_secrets, scrub_text};
use crate::tools::schema_validator::translate_schema;
use crate::tools::{CallContext, ToolDefinition, ToolRuntime};
use crate::util::{chunk_chars, truncate};
use crate::workflow::{
    DataExtractor, HeuristicExtractor, Plan, PlainFormatter, ResultFormatter, SummarySink,
    WorkflowStep,
};

/// One execution request: who runs what.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task_id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

impl RunRequest {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            conversation_id: None,
            steps,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Executes plans step by step, threading each result into the next
/// step's input. Halts on the first failed step.
pub struct ChainRunner {
    runtime: Arc<dyn ToolRuntime>,
    credentials: Option<Arc<CredentialResolver>>,
    classifier: ErrorClassifier,
    extractor: Arc<dyn DataExtractor>,
    formatter: Arc<dyn ResultFormatter>,
    summary_sink: Option<Arc<dyn SummarySink>>,
    config: RunnerConfig,
}

impl ChainRunner {
    pub fn new(runtime: Arc<dyn ToolRuntime>) -> Self {
        Self {
            runtime,
            credentials: None,
            classifier: ErrorClassifier::new(),
            extractor: Arc::new(HeuristicExtractor),
            formatter: Arc::new(PlainFormatter),
            summary_sink: None,
            config: RunnerConfig::default(),
        }
    }

    /// Without a resolver, services that require auth fail with
    /// `AUTH_REQUIRED`.
    pub fn with_credentials(mut self, resolver: Arc<CredentialResolver>) -> Self {
        self.credentials = Some(resolver);
        self
    }

    /// Replace the classifier. Its enrichment timeout is taken from the
    /// runner config.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier.with_enrich_timeout(self.config.enrich_timeout);
        self
    }

    /// Attach a best-effort enricher for step failures.
    pub fn with_enricher(mut self, enricher: Arc<dyn ErrorEnricher>) -> Self {
        let classifier = std::mem::take(&mut self.classifier);
        self.classifier = classifier.with_enricher(enricher, self.config.enrich_timeout);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ResultFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_summary_sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.summary_sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        let classifier = std::mem::take(&mut self.classifier);
        self.classifier = classifier.with_enrich_timeout(config.enrich_timeout);
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a plan to completion.
    ///
    /// Step failures are reported through events and the returned summary;
    /// only an invalid plan is an `Err`.
    pub async fn run(
        &self,
        request: RunRequest,
        sink: &dyn EventSink,
    ) -> Result<ExecutionSummary, Error> {
        let span = tracing::info_span!(
            "execution",
            task_id = %request.task_id,
            user_id = %request.user_id,
        );
        self.run_inner(request, sink).instrument(span).await
    }

    async fn run_inner(
        &self,
        request: RunRequest,
        sink: &dyn EventSink,
    ) -> Result<ExecutionSummary, Error> {
        let plan = match Plan::new(request.steps) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Rejected plan: {}", e);
                sink.emit(ProgressEvent::Error {
                    message: e.to_string(),
                    error: None,
                });
                return Err(e.into());
            }
        };

        let mut ctx = ExecutionContext::new(&request.task_id, &request.user_id);
        if let Some(conversation_id) = &request.conversation_id {
            ctx = ctx.with_conversation(conversation_id);
        }
        let total = plan.len();

        sink.emit(ProgressEvent::ExecutionStart {
            task_id: ctx.task_id.clone(),
            user_id: ctx.user_id.clone(),
            total_steps: total,
            conversation_id: ctx.conversation_id.clone(),
        });
        self.transition(&mut ctx, ExecutionState::Running);
        tracing::info!(total_steps = total, "Execution started");

        for step in plan.steps() {
            let previous = ctx.last_success().and_then(|r| r.parsed_data.clone());
            let is_final = step.step_number as usize == total;
            let result = self
                .execute_step(&ctx, step, previous.as_ref(), is_final, total, sink)
                .await;
            let failed = !result.success;
            if let Err(e) = ctx.record(result) {
                tracing::error!("Failed to record step result: {}", e);
            }
            if failed {
                break;
            }
        }

        let success = ctx.all_succeeded(total);
        let completed_steps = ctx.step_results().iter().filter(|r| r.success).count();
        self.transition(
            &mut ctx,
            if success {
                ExecutionState::Completed
            } else {
                ExecutionState::Failed
            },
        );

        let final_result = if success {
            ctx.step_results()
                .last()
                .and_then(|r| r.formatted_result.clone())
        } else {
            ctx.step_results()
                .last()
                .and_then(|r| r.error.as_ref())
                .map(|e| e.user_message.clone())
        };

        sink.emit(ProgressEvent::WorkflowComplete {
            success,
            completed_steps,
            total_steps: total,
        });
        sink.emit(ProgressEvent::TaskComplete {
            task_id: ctx.task_id.clone(),
            success,
            final_result: final_result.clone(),
        });
        tracing::info!(success, completed_steps, total_steps = total, "Execution finished");

        let summary = ctx.summary(total, final_result);
        if let Some(summary_sink) = &self.summary_sink
            && let Err(e) = summary_sink.persist(&summary).await
        {
            tracing::warn!("Failed to persist execution summary: {}", e);
        }
        Ok(summary)
    }

    fn transition(&self, ctx: &mut ExecutionContext, state: ExecutionState) {
        if let Err(e) = ctx.transition_to(state) {
            tracing::error!("{}", e);
        }
    }

    async fn execute_step(
        &self,
        ctx: &ExecutionContext,
        step: &WorkflowStep,
        previous: Option<&Value>,
        is_final: bool,
        total: usize,
        sink: &dyn EventSink,
    ) -> StepResult {
        let number = step.step_number;
        let started = Instant::now();
        sink.emit(ProgressEvent::StatusUpdate {
            step: number,
            total_steps: total,
            message: format!("Running step {} of {}: {}", number, total, step.action),
        });

        let endpoint = match self.runtime.resolve(&step.mcp_name) {
            Ok(endpoint) => endpoint,
            Err(e) => return self.fail(step, None, e.into(), &[], started, sink).await,
        };

        let (env, secrets) = match self.call_env(&ctx.user_id, &endpoint).await {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(step, None, e.into(), &[], started, sink).await,
        };
        let secret_refs: Vec<&str> = secrets.iter().map(String::as_str).collect();

        let (input, extracted_keys) = self.step_input(step, previous);
        sink.emit(ProgressEvent::StepStart {
            step: number,
            mcp_name: step.mcp_name.clone(),
            action: step.action.clone(),
            input: self.preview(&redact_with_secrets(&input, &secret_refs)),
        });
        tracing::info!(step = number, service = %step.mcp_name, action = %step.action, "Step started");

        let mut call_ctx = CallContext::new(&ctx.user_id).with_env(env);
        let mut selected = self
            .runtime
            .select_tool(&step.mcp_name, &step.action, &call_ctx)
            .await;
        if let Some(error) = selected.discovery_error.take() {
            call_ctx = call_ctx.with_discovery_failure(error);
        }

        let input = match &selected.definition {
            Some(definition) => {
                let input = drop_unaccepted_keys(definition, input, &extracted_keys);
                match self.runtime.normalize_input(definition, input) {
                    Ok(input) => input,
                    Err(e) => {
                        return self
                            .fail(step, Some(&selected.name), e.into(), &secret_refs, started, sink)
                            .await;
                    }
                }
            }
            None => input,
        };

        sink.emit(ProgressEvent::StepExecuting {
            step: number,
            mcp_name: step.mcp_name.clone(),
            tool_name: selected.name.clone(),
        });

        let output = match self
            .runtime
            .invoke(&step.mcp_name, &selected.name, &input, &call_ctx)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                return self
                    .fail(step, Some(&selected.name), e.into(), &secret_refs, started, sink)
                    .await;
            }
        };

        let payload = self.runtime.parse_result(&output);
        let redacted = redact_with_secrets(&payload, &secret_refs);
        sink.emit(ProgressEvent::StepRawResult {
            step: number,
            tool_name: selected.name.clone(),
            result: self.preview(&redacted),
        });

        let formatted = match self.formatter.format(step, &redacted) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(step = number, "{}, using raw JSON", e);
                redacted.to_string()
            }
        };
        let formatted = scrub_text(&formatted, &secret_refs);
        self.emit_chunks(number, &formatted, is_final, sink);

        let duration_ms = started.elapsed().as_millis() as u64;
        sink.emit(ProgressEvent::StepComplete {
            step: number,
            mcp_name: step.mcp_name.clone(),
            tool_name: selected.name.clone(),
            result: formatted.clone(),
            duration_ms,
        });
        tracing::info!(
            step = number,
            tool = %selected.name,
            attempts = output.attempts,
            duration_ms,
            "Step completed"
        );

        StepResult {
            step_number: number,
            mcp_name: step.mcp_name.clone(),
            action: step.action.clone(),
            tool_name: Some(selected.name),
            success: true,
            raw_result: Some(redacted),
            formatted_result: Some(formatted),
            parsed_data: Some(payload),
            error: None,
            duration_ms,
        }
    }

    /// Env for the call plus plaintext secret values to scrub from output.
    async fn call_env(
        &self,
        user_id: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<(HashMap<String, String>, Vec<String>), CredentialError> {
        match &self.credentials {
            Some(resolver) => {
                let (env, credential) = resolver.call_env(user_id, endpoint).await?;
                let secrets = credential.map(|c| c.secret_values()).unwrap_or_default();
                Ok((env, secrets))
            }
            None if endpoint.requires_auth => Err(CredentialError::AuthRequired {
                service: endpoint.name.clone(),
            }),
            None => {
                let env = endpoint
                    .env
                    .iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Ok((env, Vec::new()))
            }
        }
    }

    /// Declared input for the first step. Later steps take the previous
    /// result through the extractor; a non-empty declared object keeps its
    /// values and extracted fields fill the keys it leaves unset.
    ///
    /// Also returns the keys that came from extraction rather than the plan.
    fn step_input(&self, step: &WorkflowStep, previous: Option<&Value>) -> (Value, Vec<String>) {
        let Some(previous) = previous.filter(|_| step.step_number > 1) else {
            return (step.input.clone(), Vec::new());
        };
        let extracted = self.extractor.extract(previous, &step.action);
        match (&step.input, extracted) {
            (Value::Object(declared), Value::Object(extracted)) if !declared.is_empty() => {
                let mut merged = declared.clone();
                let mut added = Vec::new();
                for (key, value) in extracted {
                    if !merged.contains_key(&key) {
                        added.push(key.clone());
                        merged.insert(key, value);
                    }
                }
                (Value::Object(merged), added)
            }
            (Value::Object(declared), _) if !declared.is_empty() => (step.input.clone(), Vec::new()),
            (_, Value::Object(extracted)) => {
                let added = extracted.keys().cloned().collect();
                (Value::Object(extracted), added)
            }
            (_, extracted) => (extracted, Vec::new()),
        }
    }

    fn preview(&self, value: &Value) -> Value {
        let limit = self.config.event_preview_chars;
        if limit == 0 {
            return value.clone();
        }
        let text = value.to_string();
        if text.len() <= limit {
            value.clone()
        } else {
            Value::String(truncate(&text, limit))
        }
    }

    fn emit_chunks(&self, step: u32, text: &str, is_final: bool, sink: &dyn EventSink) {
        let size = self
            .formatter
            .chunk_size()
            .or((self.config.chunk_size > 0).then_some(self.config.chunk_size));
        let Some(size) = size else { return };

        let chunks = chunk_chars(text, size);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let is_last = index == last;
            sink.emit(if is_final {
                ProgressEvent::FinalResultChunk {
                    index,
                    chunk,
                    is_last,
                }
            } else {
                ProgressEvent::StepResultChunk {
                    step,
                    index,
                    chunk,
                    is_last,
                }
            });
        }
    }

    async fn fail(
        &self,
        step: &WorkflowStep,
        tool_name: Option<&str>,
        error: ToolError,
        secrets: &[&str],
        started: Instant,
        sink: &dyn EventSink,
    ) -> StepResult {
        let mut classified = self
            .classifier
            .classify_tool_error(&error, Some(&step.mcp_name));
        classified.message = scrub_text(&classified.message, secrets);
        let classified = self.classifier.enrich(classified).await;

        tracing::warn!(
            step = step.step_number,
            service = %step.mcp_name,
            kind = %classified.kind,
            retryable = classified.retryable,
            "Step failed: {}",
            classified.message
        );
        sink.emit(ProgressEvent::StepError {
            step: step.step_number,
            mcp_name: step.mcp_name.clone(),
            error: classified.clone(),
        });

        let mut result = StepResult::failed(step.step_number, &step.mcp_name, &step.action, classified);
        result.tool_name = tool_name.map(str::to_string);
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("credentials", &self.credentials.is_some())
            .field("classifier", &self.classifier)
            .field("summary_sink", &self.summary_sink.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Remove extracted keys that a closed tool schema would reject. Keys the
/// plan declared stay, so their validation errors still surface.
fn drop_unaccepted_keys(definition: &ToolDefinition, input: Value, extracted: &[String]) -> Value {
    if extracted.is_empty() {
        return input;
    }
    match input {
        Value::Object(mut map) => {
            let validator = translate_schema(&definition.input_schema);
            for key in extracted {
                if !validator.accepts_key(key) && map.remove(key).is_some() {
                    tracing::debug!(
                        tool = %definition.name,
                        key = %key,
                        "Dropped extracted key the tool does not accept"
                    );
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
