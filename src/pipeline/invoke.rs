//! Generation invoker: extracted text → validated [`GenerationResult`].
//!
//! 1. Pull the named template from the prompt store.
//! 2. Bind the text under every configured document alias, plus the
//!    requested question count.
//! 3. Render, checking that the template consumed at least one alias.
//! 4. Call the backend and validate its reply against the schema.
//!
//! Nothing is retried here. `max_questions` only reaches the model through the
//! prompt; a reply with more items than requested is returned unchanged as long
//! as it stays within the schema's hard bound.

use crate::config::GenerationConfig;
use crate::error::Pdf2McqError;
use crate::pipeline::extract::ExtractedText;
use crate::pipeline::llm::{BackendError, GenerationBackend, GenerationRequest};
use crate::prompt_store::PromptStore;
use crate::prompts::{PromptTemplate, RenderedPrompt, Variables};
use crate::schema::{GenerationResult, MaxQuestions, SchemaViolation};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Combines a prompt store and a generation backend.
#[derive(Clone)]
pub struct GenerationInvoker {
    prompt_store: Arc<dyn PromptStore>,
    backend: Arc<dyn GenerationBackend>,
    prompt_name: String,
    document_aliases: Vec<String>,
    max_questions_variable: String,
    strict_aliases: bool,
}

impl GenerationInvoker {
    pub fn new(
        prompt_store: Arc<dyn PromptStore>,
        backend: Arc<dyn GenerationBackend>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            prompt_store,
            backend,
            prompt_name: config.prompt_name.clone(),
            document_aliases: config.document_aliases.clone(),
            max_questions_variable: config.max_questions_variable.clone(),
            strict_aliases: config.strict_aliases,
        }
    }

    /// Generate up to `max_questions` items from `text`.
    pub async fn invoke(
        &self,
        text: &ExtractedText,
        max_questions: MaxQuestions,
    ) -> Result<GenerationResult, Pdf2McqError> {
        let template = self.prompt_store.pull(&self.prompt_name).await?;
        let rendered = self.render(&template, text, max_questions)?;

        let request = GenerationRequest::new(rendered.text, max_questions);
        debug!(
            "Sending {} prompt chars to backend '{}'",
            request.prompt.len(),
            self.backend.name()
        );

        let value = self
            .backend
            .generate(&request)
            .await
            .map_err(|e| self.backend_error(e))?;

        let result = GenerationResult::from_value(&value)?;

        if result.len() > max_questions.get() as usize {
            info!(
                "Backend returned {} items for max_questions={}; keeping all",
                result.len(),
                max_questions
            );
        }
        Ok(result)
    }

    /// Bind variables and render, enforcing the alias policy.
    fn render(
        &self,
        template: &PromptTemplate,
        text: &ExtractedText,
        max_questions: MaxQuestions,
    ) -> Result<RenderedPrompt, Pdf2McqError> {
        let mut variables = Variables::new();
        for alias in &self.document_aliases {
            variables.insert(alias.clone(), text.as_str().to_string());
        }
        variables.insert(self.max_questions_variable.clone(), max_questions.to_string());

        let rendered = template.render(&variables).map_err(|e| Pdf2McqError::PromptResolution {
            name: template.name.clone(),
            detail: e.to_string(),
        })?;

        let (used, unused): (Vec<&String>, Vec<&String>) = self
            .document_aliases
            .iter()
            .partition(|a| rendered.consumed.contains(a.as_str()));

        if used.is_empty() {
            let detail = format!(
                "template uses none of the document aliases [{}]",
                self.document_aliases.join(", ")
            );
            if self.strict_aliases {
                return Err(Pdf2McqError::PromptResolution {
                    name: template.name.clone(),
                    detail,
                });
            }
            warn!("Prompt '{}': {}; sending without document text", template.name, detail);
        } else if !unused.is_empty() {
            debug!("Prompt '{}' ignores aliases {:?}", template.name, unused);
        }

        if !rendered.consumed.contains(&self.max_questions_variable) {
            debug!(
                "Prompt '{}' does not use '{}'; question count not communicated",
                template.name, self.max_questions_variable
            );
        }

        Ok(rendered)
    }

    fn backend_error(&self, error: BackendError) -> Pdf2McqError {
        match error {
            BackendError::Unavailable(detail) => Pdf2McqError::GenerationBackend {
                backend: self.backend.name().to_string(),
                detail,
            },
            e @ BackendError::Unstructured { .. } => {
                Pdf2McqError::SchemaViolation(SchemaViolation::new("$", e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt_store::StaticPromptStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Returns a canned reply and records the prompts it was sent.
    struct CannedBackend {
        reply: Result<Value, BackendError>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedBackend {
        fn new(reply: Result<Value, BackendError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.reply.clone()
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn item(options: usize) -> Value {
        json!({
            "question": "What does the mitral valve separate?",
            "options": (0..options).map(|i| format!("option {i}")).collect::<Vec<_>>(),
            "correct_index": 0,
            "explanation": "It sits between the left atrium and left ventricle."
        })
    }

    fn items(n: usize) -> Value {
        json!({ "items": (0..n).map(|_| item(4)).collect::<Vec<_>>() })
    }

    fn invoker(template: &str, backend: Arc<CannedBackend>, strict: bool) -> GenerationInvoker {
        let store = StaticPromptStore::new().with_template("quiz", template);
        let config = GenerationConfig::builder()
            .prompt_name("quiz")
            .strict_aliases(strict)
            .build()
            .unwrap();
        GenerationInvoker::new(Arc::new(store), backend, &config)
    }

    fn text() -> ExtractedText {
        ExtractedText::new("The heart has four chambers.")
    }

    fn max(n: u32) -> MaxQuestions {
        MaxQuestions::new(n).unwrap()
    }

    #[tokio::test]
    async fn binds_text_under_whichever_alias_the_template_uses() {
        let backend = CannedBackend::new(Ok(items(2)));
        let inv = invoker("Ask {max_questions} about: {context}", backend.clone(), true);

        let result = inv.invoke(&text(), max(2)).await.unwrap();

        assert_eq!(result.len(), 2);
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts[0], "Ask 2 about: The heart has four chambers.");
    }

    #[tokio::test]
    async fn extra_items_are_kept() {
        let backend = CannedBackend::new(Ok(items(5)));
        let inv = invoker("{document}", backend, true);
        let result = inv.invoke(&text(), max(3)).await.unwrap();
        assert_eq!(result.len(), 5);
    }

    #[tokio::test]
    async fn three_options_is_a_schema_violation() {
        let backend = CannedBackend::new(Ok(json!({ "items": [item(4), item(3)] })));
        let inv = invoker("{text}", backend, true);
        match inv.invoke(&text(), max(2)).await.unwrap_err() {
            Pdf2McqError::SchemaViolation(v) => assert_eq!(v.path, "items[1].options"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_items_is_a_schema_violation() {
        let backend = CannedBackend::new(Ok(json!({ "items": [] })));
        let inv = invoker("{content}", backend, true);
        assert!(matches!(
            inv.invoke(&text(), max(1)).await,
            Err(Pdf2McqError::SchemaViolation(_))
        ));
    }

    #[tokio::test]
    async fn unstructured_backend_reply_is_a_schema_violation() {
        let backend = CannedBackend::new(Err(BackendError::Unstructured {
            attempts: 2,
            detail: "reply is not valid JSON".into(),
        }));
        let inv = invoker("{document}", backend, true);
        let err = inv.invoke(&text(), max(1)).await.unwrap_err();
        assert!(matches!(err, Pdf2McqError::SchemaViolation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unavailable_backend_is_a_backend_error() {
        let backend = CannedBackend::new(Err(BackendError::Unavailable("401 Unauthorized".into())));
        let inv = invoker("{document}", backend, true);
        match inv.invoke(&text(), max(1)).await.unwrap_err() {
            Pdf2McqError::GenerationBackend { backend, detail } => {
                assert_eq!(backend, "canned");
                assert!(detail.contains("401"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_template_is_a_resolution_error() {
        let backend = CannedBackend::new(Ok(items(1)));
        let config = GenerationConfig::builder().prompt_name("absent").build().unwrap();
        let inv = GenerationInvoker::new(Arc::new(StaticPromptStore::new()), backend.clone(), &config);
        assert!(matches!(
            inv.invoke(&text(), max(1)).await,
            Err(Pdf2McqError::PromptResolution { .. })
        ));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_without_alias_fails_in_strict_mode() {
        let backend = CannedBackend::new(Ok(items(1)));
        let inv = invoker("Write {max_questions} questions.", backend.clone(), true);
        let err = inv.invoke(&text(), max(1)).await.unwrap_err();
        assert!(matches!(err, Pdf2McqError::PromptResolution { .. }), "{err:?}");
        assert!(err.to_string().contains("document, context, text, content"));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_without_alias_proceeds_in_lenient_mode() {
        let backend = CannedBackend::new(Ok(items(1)));
        let inv = invoker("Write {max_questions} questions.", backend.clone(), false);
        assert!(inv.invoke(&text(), max(1)).await.is_ok());
        assert_eq!(backend.prompts.lock().unwrap()[0], "Write 1 questions.");
    }

    #[tokio::test]
    async fn unknown_placeholder_is_a_resolution_error() {
        let backend = CannedBackend::new(Ok(items(1)));
        let inv = invoker("{document} for {audience}", backend, true);
        let err = inv.invoke(&text(), max(1)).await.unwrap_err();
        assert!(err.to_string().contains("audience"), "{err}");
    }
}
