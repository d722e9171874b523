//! Configuration types for PDF-to-quiz generation.
//!
//! All pipeline behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. The config is read-only once built and
//! is shared by every run of a [`crate::Pipeline`].
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest. Collaborators (model backend, prompt
//! store, object store) are injected here too, which is how tests swap in
//! fakes.

use crate::error::Pdf2McqError;
use crate::pipeline::llm::GenerationBackend;
use crate::progress::ProgressCallback;
use crate::prompt_store::PromptStore;
use crate::prompts::DEFAULT_PROMPT_NAME;
use crate::schema::MaxQuestions;
use crate::storage::ObjectStore;
use edgequake_llm::LLMProvider;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Variable names the document text is bound under by default.
pub const DEFAULT_DOCUMENT_ALIASES: [&str; 4] = ["document", "context", "text", "content"];

/// Variable name the requested question count is bound under by default.
pub const DEFAULT_MAX_QUESTIONS_VARIABLE: &str = "max_questions";

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for quiz generation.
///
/// Built via [`GenerationConfig::builder()`] or using
/// [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2mcq::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .prompt_name("biology-quiz")
///     .document_aliases(["context", "text"])
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Name of the template pulled from the prompt store. Default: `"mcq-generator"`.
    pub prompt_name: String,

    /// Variable names under which the extracted text is bound.
    /// Default: `document`, `context`, `text`, `content`.
    ///
    /// Templates are maintained separately from this crate, so the variable a
    /// given template expects is not known ahead of time. Every alias receives
    /// the same text; the template consumes whichever it names.
    pub document_aliases: Vec<String>,

    /// Variable name for the requested question count. Default: `"max_questions"`.
    pub max_questions_variable: String,

    /// Fail when the template consumes none of the aliases. Default: true.
    ///
    /// When false, the mismatch is logged at `warn` and the prompt is sent
    /// without any document text.
    pub strict_aliases: bool,

    /// Question count used when the caller does not give one. Default: 10.
    pub default_max_questions: MaxQuestions,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// Ten questions with explanations fit comfortably; setting this too low
    /// truncates the JSON and every reply fails validation.
    pub max_tokens: usize,

    /// Replies the LLM backend will request before giving up on schema-valid
    /// output. Default: 2. Minimum: 1.
    pub structured_attempts: u32,

    /// Custom structured-output instructions. `{schema}` is replaced with the
    /// JSON Schema. If None, uses the built-in instructions.
    pub system_prompt: Option<String>,

    /// Pre-constructed generation backend. Takes precedence over every LLM setting.
    pub backend: Option<Arc<dyn GenerationBackend>>,

    /// Prompt store. If None, the built-in store holding the default template.
    pub prompt_store: Option<Arc<dyn PromptStore>>,

    /// Object store for remote references. If None, an S3 client is built from
    /// the AWS environment the first time a remote reference is resolved.
    pub object_store: Option<Arc<dyn ObjectStore>>,

    /// Custom S3 endpoint (MinIO, LocalStack…). Only used for the lazily built S3 client.
    pub s3_endpoint: Option<String>,

    /// Stage event receiver.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt_name: DEFAULT_PROMPT_NAME.to_string(),
            document_aliases: DEFAULT_DOCUMENT_ALIASES.iter().map(|s| s.to_string()).collect(),
            max_questions_variable: DEFAULT_MAX_QUESTIONS_VARIABLE.to_string(),
            strict_aliases: true,
            default_max_questions: MaxQuestions::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            structured_attempts: 2,
            system_prompt: None,
            backend: None,
            prompt_store: None,
            object_store: None,
            s3_endpoint: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("prompt_name", &self.prompt_name)
            .field("document_aliases", &self.document_aliases)
            .field("max_questions_variable", &self.max_questions_variable)
            .field("strict_aliases", &self.strict_aliases)
            .field("default_max_questions", &self.default_max_questions)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("structured_attempts", &self.structured_attempts)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("prompt_store", &self.prompt_store.as_ref().map(|_| "<dyn PromptStore>"))
            .field("object_store", &self.object_store.as_ref().map(|s| s.name().to_string()))
            .field("s3_endpoint", &self.s3_endpoint)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn prompt_name(mut self, name: impl Into<String>) -> Self {
        self.config.prompt_name = name.into();
        self
    }

    pub fn document_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.document_aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_questions_variable(mut self, name: impl Into<String>) -> Self {
        self.config.max_questions_variable = name.into();
        self
    }

    pub fn strict_aliases(mut self, v: bool) -> Self {
        self.config.strict_aliases = v;
        self
    }

    pub fn default_max_questions(mut self, n: u32) -> Self {
        self.config.default_max_questions = MaxQuestions::saturating(n);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn structured_attempts(mut self, n: u32) -> Self {
        self.config.structured_attempts = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn prompt_store(mut self, store: Arc<dyn PromptStore>) -> Self {
        self.config.prompt_store = Some(store);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.config.object_store = Some(store);
        self
    }

    pub fn s3_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.s3_endpoint = Some(url.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, Pdf2McqError> {
        let c = &self.config;
        if c.prompt_name.trim().is_empty() {
            return Err(Pdf2McqError::InvalidConfig("Prompt name must not be empty".into()));
        }
        if c.document_aliases.is_empty() {
            return Err(Pdf2McqError::InvalidConfig(
                "At least one document alias is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for alias in &c.document_aliases {
            if alias.trim().is_empty() {
                return Err(Pdf2McqError::InvalidConfig(
                    "Document aliases must not be empty".into(),
                ));
            }
            if !seen.insert(alias.as_str()) {
                return Err(Pdf2McqError::InvalidConfig(format!(
                    "Duplicate document alias '{alias}'"
                )));
            }
        }
        if c.max_questions_variable.trim().is_empty() {
            return Err(Pdf2McqError::InvalidConfig(
                "max_questions variable name must not be empty".into(),
            ));
        }
        if seen.contains(c.max_questions_variable.as_str()) {
            return Err(Pdf2McqError::InvalidConfig(format!(
                "'{}' is used both as a document alias and as the max_questions variable",
                c.max_questions_variable
            )));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2McqError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
