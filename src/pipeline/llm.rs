//! Generation backend: schema-constrained quiz generation over a chat model.
//!
//! [`GenerationBackend`] is the capability the invoker depends on: hand it a
//! rendered prompt plus the target JSON Schema and get back a JSON value. The
//! invoker re-validates whatever comes back, so a backend is free to be loose.
//!
//! [`LlmBackend`] implements it on top of `edgequake-llm`.
//!
//! ## Message Layout
//!
//! 1. **System message** — structured-output instructions with the embedded
//!    JSON Schema (or the caller's override)
//! 2. **User message** — the rendered prompt
//!
//! ## Structured-output attempts
//!
//! A reply that is not JSON, or is JSON outside the schema, is answered with
//! the offending reply as an assistant turn plus a repair message naming the
//! problem, and the model is asked again. After `attempts` rejected replies the
//! backend gives up with [`BackendError::Unstructured`]. Transport and auth
//! errors are never re-asked: they end the call as [`BackendError::Unavailable`].

use crate::config::GenerationConfig;
use crate::pipeline::postprocess::clean_json_payload;
use crate::prompts::{repair_message, structured_output_instructions};
use crate::schema::{GenerationResult, MaxQuestions};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Everything a backend needs for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The rendered prompt (document text already substituted).
    pub prompt: String,
    /// JSON Schema the reply must satisfy.
    pub schema: Value,
    /// Soft bound already communicated through the prompt.
    pub max_questions: MaxQuestions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_questions: MaxQuestions) -> Self {
        Self {
            prompt: prompt.into(),
            schema: GenerationResult::json_schema(),
            max_questions,
        }
    }
}

/// Failure reported by a [`GenerationBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The model could not be reached or rejected the request.
    #[error("{0}")]
    Unavailable(String),

    /// Every reply violated the output schema.
    #[error("no schema-valid reply after {attempts} attempt(s): {detail}")]
    Unstructured { attempts: u32, detail: String },
}

/// Schema-constrained generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError>;

    /// Short label used in errors and logs.
    fn name(&self) -> &str {
        "backend"
    }
}

/// [`GenerationBackend`] over an `edgequake-llm` chat provider.
#[derive(Clone)]
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    system_prompt: Option<String>,
    options: CompletionOptions,
    attempts: u32,
}

impl std::fmt::Debug for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmBackend")
            .field("label", &self.label)
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<custom>"))
            .field("temperature", &self.options.temperature)
            .field("max_tokens", &self.options.max_tokens)
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl LlmBackend {
    /// Wrap `provider`, taking sampling settings from `config`.
    pub fn from_config(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            system_prompt: config.system_prompt.clone(),
            options: build_options(config),
            attempts: config.structured_attempts.max(1),
        }
    }

    fn initial_messages(&self, request: &GenerationRequest) -> Vec<ChatMessage> {
        let system =
            structured_output_instructions(&request.schema, self.system_prompt.as_deref());
        vec![
            ChatMessage::system(system),
            ChatMessage::user(request.prompt.clone()),
        ]
    }
}

#[async_trait]
impl GenerationBackend for LlmBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
        let start = Instant::now();
        let mut messages = self.initial_messages(request);
        let mut last_problem = String::new();

        for attempt in 1..=self.attempts {
            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;

            debug!(
                "{}: attempt {}: {} input tokens, {} output tokens, {:?}",
                self.label,
                attempt,
                response.prompt_tokens,
                response.completion_tokens,
                start.elapsed()
            );

            match parse_reply(&response.content) {
                Ok(value) => return Ok(value),
                Err(problem) => {
                    warn!(
                        "{}: attempt {}/{} rejected: {}",
                        self.label, attempt, self.attempts, problem
                    );
                    messages.push(ChatMessage::assistant(response.content));
                    messages.push(ChatMessage::user(repair_message(&problem)));
                    last_problem = problem;
                }
            }
        }

        Err(BackendError::Unstructured {
            attempts: self.attempts,
            detail: last_problem,
        })
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Clean a raw reply and check it against the schema.
///
/// Returns the JSON value on success, otherwise a one-line description of the
/// problem suitable for a repair message.
fn parse_reply(content: &str) -> Result<Value, String> {
    let cleaned = clean_json_payload(content);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| format!("reply is not valid JSON ({e})"))?;
    GenerationResult::from_value(&value).map_err(|v| v.to_string())?;
    Ok(value)
}

/// Build `CompletionOptions` from the generation config.
fn build_options(config: &GenerationConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
