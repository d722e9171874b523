//! Pipeline facade: document reference → validated quiz.
//!
//! [`Pipeline`] resolves its collaborators (model backend, prompt store,
//! object store) once from a [`GenerationConfig`] and can then serve any
//! number of concurrent runs. Each run is `resolve → extract → invoke`; the
//! first failure is returned unchanged and there are no partial results.
//!
//! The free functions ([`generate`], [`generate_sync`], [`generate_to_file`],
//! [`extract_only`]) build a pipeline per call for one-shot use.

use crate::config::{GenerationConfig, DEFAULT_MODEL};
use crate::error::Pdf2McqError;
use crate::pipeline::extract::{self, ExtractionReport};
use crate::pipeline::input::{self, DocumentReference, ObjectStoreSource};
use crate::pipeline::invoke::GenerationInvoker;
use crate::pipeline::llm::{GenerationBackend, LlmBackend};
use crate::progress::{ProgressCallback, Stage};
use crate::prompt_store::{PromptStore, StaticPromptStore};
use crate::schema::{GenerationResult, MaxQuestions};
use crate::storage::{ObjectStore, S3ObjectStore, S3_SCHEMES};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// A configured, reusable pipeline. Cheap to clone; safe to share across tasks.
#[derive(Clone)]
pub struct Pipeline {
    objects: Arc<LazyObjectStore>,
    invoker: GenerationInvoker,
    default_max_questions: MaxQuestions,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("default_max_questions", &self.default_max_questions)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Resolve collaborators from `config`.
    ///
    /// # Errors
    /// [`Pdf2McqError::ProviderNotConfigured`] when no backend is injected and
    /// no LLM provider can be found.
    pub fn new(config: &GenerationConfig) -> Result<Self, Pdf2McqError> {
        let backend = resolve_backend(config)?;
        let prompt_store: Arc<dyn PromptStore> = match config.prompt_store {
            Some(ref store) => Arc::clone(store),
            None => Arc::new(StaticPromptStore::builtin()),
        };
        info!(
            "Pipeline ready: backend '{}', prompt '{}'",
            backend.name(),
            config.prompt_name
        );

        Ok(Self {
            objects: Arc::new(LazyObjectStore::from_config(config)),
            invoker: GenerationInvoker::new(prompt_store, backend, config),
            default_max_questions: config.default_max_questions,
            progress: config.progress_callback.clone(),
        })
    }

    pub fn default_max_questions(&self) -> MaxQuestions {
        self.default_max_questions
    }

    /// Run one request: resolve, extract, generate.
    pub async fn run(
        &self,
        reference: DocumentReference,
        max_questions: MaxQuestions,
    ) -> Result<GenerationResult, Pdf2McqError> {
        let start = Instant::now();
        info!("Starting generation: {} ({})", reference, reference.kind());

        let report = self.extract(reference).await?;
        let text = report.text;

        let result = self
            .stage(Stage::Generate, self.invoker.invoke(&text, max_questions))
            .await?;

        info!(
            "Generated {} items (requested ≤ {}) in {}ms",
            result.len(),
            max_questions,
            start.elapsed().as_millis()
        );
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_complete(result.len());
        }
        Ok(result)
    }

    /// Resolve and extract only; no model call.
    pub async fn extract(
        &self,
        reference: DocumentReference,
    ) -> Result<ExtractionReport, Pdf2McqError> {
        resolve_and_extract(reference, self.objects.as_ref(), self.progress.as_ref()).await
    }

    async fn stage<T, F>(&self, stage: Stage, fut: F) -> Result<T, Pdf2McqError>
    where
        F: Future<Output = Result<T, Pdf2McqError>>,
    {
        run_stage(self.progress.as_ref(), stage, fut).await
    }
}

/// Generate a quiz from `reference`.
///
/// `max_questions` of `None` uses [`GenerationConfig::default_max_questions`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2mcq::{generate, DocumentReference, GenerationConfig, MaxQuestions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = GenerationConfig::default();
/// let quiz = generate(
///     DocumentReference::local_path("lecture.pdf"),
///     Some(MaxQuestions::new(5)?),
///     &config,
/// )
/// .await?;
/// println!("{}", quiz.to_json_pretty());
/// # Ok(())
/// # }
/// ```
pub async fn generate(
    reference: DocumentReference,
    max_questions: Option<MaxQuestions>,
    config: &GenerationConfig,
) -> Result<GenerationResult, Pdf2McqError> {
    let pipeline = Pipeline::new(config)?;
    let max_questions = max_questions.unwrap_or(pipeline.default_max_questions());
    pipeline.run(reference, max_questions).await
}

/// Generate a quiz and write it as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn generate_to_file(
    reference: DocumentReference,
    max_questions: Option<MaxQuestions>,
    output_path: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationResult, Pdf2McqError> {
    let result = generate(reference, max_questions, config).await?;
    write_json_file(output_path, &result).await?;
    Ok(result)
}

/// Write `result` as pretty JSON to `path`, atomically.
pub async fn write_json_file(
    path: impl AsRef<Path>,
    result: &GenerationResult,
) -> Result<(), Pdf2McqError> {
    write_json_atomic(path.as_ref(), &result.to_json_pretty()).await
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    reference: DocumentReference,
    max_questions: Option<MaxQuestions>,
    config: &GenerationConfig,
) -> Result<GenerationResult, Pdf2McqError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2McqError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(reference, max_questions, config))
}

/// Resolve and extract text without generating.
///
/// Does not require an LLM provider or API key.
pub async fn extract_only(
    reference: DocumentReference,
    config: &GenerationConfig,
) -> Result<ExtractionReport, Pdf2McqError> {
    let objects = LazyObjectStore::from_config(config);
    resolve_and_extract(reference, &objects, config.progress_callback.as_ref()).await
}

/// Write `contents` to `path` through a sibling temp file.
async fn write_json_atomic(path: &Path, contents: &str) -> Result<(), Pdf2McqError> {
    let write_err = |source| Pdf2McqError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn resolve_and_extract(
    reference: DocumentReference,
    objects: &dyn ObjectStoreSource,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractionReport, Pdf2McqError> {
    let bytes = run_stage(progress, Stage::Resolve, input::resolve(reference, objects)).await?;
    let report = run_stage(progress, Stage::Extract, extract::extract_report(bytes)).await?;

    if let Some(cb) = progress {
        for e in &report.page_errors {
            cb.on_page_error(e.page(), report.page_count, &e.to_string());
        }
    }
    info!(
        "Extracted {} chars from {} pages ({} failed)",
        report.text.as_str().len(),
        report.page_count,
        report.failed_pages()
    );
    Ok(report)
}

async fn run_stage<T, F>(
    progress: Option<&ProgressCallback>,
    stage: Stage,
    fut: F,
) -> Result<T, Pdf2McqError>
where
    F: Future<Output = Result<T, Pdf2McqError>>,
{
    if let Some(cb) = progress {
        cb.on_stage_start(stage);
    }
    let value = fut.await?;
    if let Some(cb) = progress {
        cb.on_stage_complete(stage);
    }
    Ok(value)
}

/// Injected object store, or an S3 client built on first use.
struct LazyObjectStore {
    injected: Option<Arc<dyn ObjectStore>>,
    endpoint: Option<String>,
    s3: OnceCell<Arc<dyn ObjectStore>>,
}

impl LazyObjectStore {
    fn from_config(config: &GenerationConfig) -> Self {
        Self {
            injected: config.object_store.clone(),
            endpoint: config.s3_endpoint.clone(),
            s3: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ObjectStoreSource for LazyObjectStore {
    async fn object_store(&self) -> Result<Arc<dyn ObjectStore>, Pdf2McqError> {
        if let Some(ref store) = self.injected {
            return Ok(Arc::clone(store));
        }
        let store = self
            .s3
            .get_or_init(|| async {
                debug!("Building S3 client from environment");
                Arc::new(S3ObjectStore::from_env(self.endpoint.as_deref()).await)
                    as Arc<dyn ObjectStore>
            })
            .await;
        Ok(Arc::clone(store))
    }

    fn serves(&self, scheme: &str) -> bool {
        match self.injected {
            Some(ref store) => ObjectStore::serves(store.as_ref(), scheme),
            None => S3_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)),
        }
    }
}

/// Pick the generation backend: injected backend first, else an
/// [`LlmBackend`] over the resolved provider.
fn resolve_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>, Pdf2McqError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    let (provider, label) = resolve_provider(config)?;
    Ok(Arc::new(LlmBackend::from_config(provider, label, config)))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2McqError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2McqError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), via
///    [`ProviderFactory::create_llm_provider`] which reads the matching API key.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`), both set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present, even if other keys are too.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Returns the provider with a label for logs and errors.
fn resolve_provider(config: &GenerationConfig) -> Result<(Arc<dyn LLMProvider>, String), Pdf2McqError> {
    if let Some(ref provider) = config.provider {
        return Ok((Arc::clone(provider), "custom".to_string()));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return Ok((create_provider(name, model)?, name.clone()));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok((create_provider(&prov, &model)?, prov));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return Ok((create_provider("openai", model)?, "openai".to_string()));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2McqError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, "auto".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{BackendError, GenerationRequest};
    use crate::progress::PipelineProgressCallback;
    use crate::storage::ObjectStoreError;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NeverCalled;

    #[async_trait]
    impl GenerationBackend for NeverCalled {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Value, BackendError> {
            panic!("backend must not be reached");
        }
    }

    struct CountingStore(AtomicUsize);

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn fetch(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, ObjectStoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(b"not a pdf".to_vec())
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl PipelineProgressCallback for Events {
        fn on_stage_start(&self, stage: Stage) {
            self.0.lock().unwrap().push(format!("start {stage:?}"));
        }
        fn on_stage_complete(&self, stage: Stage) {
            self.0.lock().unwrap().push(format!("done {stage:?}"));
        }
    }

    #[tokio::test]
    async fn injected_backend_skips_provider_resolution() {
        let config = GenerationConfig::builder()
            .backend(Arc::new(NeverCalled))
            .build()
            .unwrap();
        assert!(Pipeline::new(&config).is_ok());
    }

    #[tokio::test]
    async fn failing_stage_is_not_reported_complete() {
        let events = Arc::new(Events::default());
        let config = GenerationConfig::builder()
            .backend(Arc::new(NeverCalled))
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline
            .run(DocumentReference::bytes(b"hello".to_vec()), MaxQuestions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Pdf2McqError::MalformedDocument { .. }));
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start Resolve", "done Resolve", "start Extract"]
        );
    }

    #[tokio::test]
    async fn injected_object_store_is_used_for_remote_references() {
        let store = Arc::new(CountingStore(AtomicUsize::new(0)));
        let config = GenerationConfig::builder()
            .object_store(store.clone())
            .build()
            .unwrap();

        let err = extract_only(DocumentReference::remote_uri("s3://bucket/doc.pdf"), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, Pdf2McqError::MalformedDocument { .. }));
        assert_eq!(store.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_s3_uri_is_rejected_before_any_client_is_built() {
        let config = GenerationConfig::builder()
            .backend(Arc::new(NeverCalled))
            .build()
            .unwrap();
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline
            .extract(DocumentReference::parse("https://example.com/papers/x.pdf").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, Pdf2McqError::InvalidReference { .. }), "{err:?}");
        assert!(pipeline.objects.s3.get().is_none());
    }

    #[tokio::test]
    async fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/quiz.json");
        write_json_atomic(&path, "{\"items\": []}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"items\": []}");
        assert!(!path.with_extension("json.tmp").exists());
    }
}
