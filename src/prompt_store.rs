//! Prompt-template stores: fetch a template by name.
//!
//! The template a deployment uses is an external, separately-versioned
//! resource, so the invoker only knows it by name. Three stores ship with the
//! crate:
//!
//! | Store | Source |
//! |-------|--------|
//! | [`StaticPromptStore`] | in-memory map; [`StaticPromptStore::builtin`] holds the default template |
//! | [`DirPromptStore`]    | `<dir>/<name>.txt` or `<dir>/<name>.md` |
//! | [`HttpPromptStore`]   | `GET <base_url>/<name>`, plain text or `{"template": "…"}` |
//!
//! Every failure surfaces as [`Pdf2McqError::PromptResolution`].

use crate::error::Pdf2McqError;
use crate::prompts::{PromptTemplate, DEFAULT_PROMPT_NAME, DEFAULT_TEMPLATE};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Fetch-by-name capability over a prompt-template store.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn pull(&self, name: &str) -> Result<PromptTemplate, Pdf2McqError>;
}

fn resolution_error(name: &str, detail: impl Into<String>) -> Pdf2McqError {
    Pdf2McqError::PromptResolution {
        name: name.to_string(),
        detail: detail.into(),
    }
}

/// Names become file names and URL path segments, so they are restricted.
fn validate_name(name: &str) -> Result<(), Pdf2McqError> {
    if name.trim().is_empty() {
        return Err(resolution_error(name, "prompt name is empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(resolution_error(
            name,
            "prompt name must not contain path separators",
        ));
    }
    Ok(())
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptStore {
    templates: HashMap<String, String>,
}

impl StaticPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding only the built-in default template.
    pub fn builtin() -> Self {
        Self::new().with_template(DEFAULT_PROMPT_NAME, DEFAULT_TEMPLATE)
    }

    pub fn with_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(name.into(), text.into());
        self
    }
}

#[async_trait]
impl PromptStore for StaticPromptStore {
    async fn pull(&self, name: &str) -> Result<PromptTemplate, Pdf2McqError> {
        validate_name(name)?;
        self.templates
            .get(name)
            .map(|text| PromptTemplate::new(name, text.clone()))
            .ok_or_else(|| resolution_error(name, "no template with this name"))
    }
}

// ── Directory ────────────────────────────────────────────────────────────

/// Templates stored as files in a directory.
#[derive(Debug, Clone)]
pub struct DirPromptStore {
    root: PathBuf,
}

impl DirPromptStore {
    /// Extensions tried in order.
    pub const EXTENSIONS: [&'static str; 2] = ["txt", "md"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PromptStore for DirPromptStore {
    async fn pull(&self, name: &str) -> Result<PromptTemplate, Pdf2McqError> {
        validate_name(name)?;

        for ext in Self::EXTENSIONS {
            let path = self.root.join(format!("{name}.{ext}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    debug!("Loaded prompt '{}' from {}", name, path.display());
                    return Ok(PromptTemplate::new(name, text));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(resolution_error(
                        name,
                        format!("failed to read {}: {e}", path.display()),
                    ))
                }
            }
        }

        Err(resolution_error(
            name,
            format!(
                "no {name}.txt or {name}.md in {}",
                self.root.display()
            ),
        ))
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// Templates served over HTTP(S) at `<base_url>/<name>`.
#[derive(Debug, Clone)]
pub struct HttpPromptStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPromptStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Result<Self, Pdf2McqError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2McqError::InvalidConfig(format!("HTTP prompt store: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }
}

#[async_trait]
impl PromptStore for HttpPromptStore {
    async fn pull(&self, name: &str) -> Result<PromptTemplate, Pdf2McqError> {
        validate_name(name)?;
        let url = self.url_for(name);
        debug!("Fetching prompt '{}' from {}", name, url);

        let mut request = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| resolution_error(name, format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(resolution_error(name, format!("not found at {url}")));
        }
        if !status.is_success() {
            return Err(resolution_error(name, format!("HTTP {status} from {url}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| resolution_error(name, format!("failed to read body: {e}")))?;

        Ok(PromptTemplate::new(name, template_from_body(&body)))
    }
}

/// A body that is a JSON object with a string `template` field yields that
/// field; any other body is the template text itself.
fn template_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("template").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_store_has_default() {
        let t = StaticPromptStore::builtin()
            .pull(DEFAULT_PROMPT_NAME)
            .await
            .unwrap();
        assert_eq!(t.text, DEFAULT_TEMPLATE);
    }

    #[tokio::test]
    async fn unknown_name_is_resolution_error() {
        let err = StaticPromptStore::builtin().pull("nope").await.unwrap_err();
        assert!(matches!(err, Pdf2McqError::PromptResolution { ref name, .. } if name == "nope"));
    }

    #[test]
    fn with_template_overrides_builtin() {
        let store = StaticPromptStore::builtin().with_template(DEFAULT_PROMPT_NAME, "{text}");
        let t = tokio_test::block_on(store.pull(DEFAULT_PROMPT_NAME)).unwrap();
        assert_eq!(t.text, "{text}");
    }

    #[tokio::test]
    async fn names_with_separators_are_rejected() {
        let store = DirPromptStore::new("/tmp");
        for bad in ["../etc/passwd", "a/b", "", ".."] {
            assert!(matches!(
                store.pull(bad).await,
                Err(Pdf2McqError::PromptResolution { .. })
            ));
        }
    }

    #[tokio::test]
    async fn dir_store_prefers_txt_then_md() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("quiz.md"), "md {document}").unwrap();
        let store = DirPromptStore::new(dir.path());
        assert_eq!(store.pull("quiz").await.unwrap().text, "md {document}");

        std::fs::write(dir.path().join("quiz.txt"), "txt {document}").unwrap();
        assert_eq!(store.pull("quiz").await.unwrap().text, "txt {document}");

        let err = store.pull("missing").await.unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn http_body_formats() {
        assert_eq!(template_from_body(r#"{"template": "Q: {text}"}"#), "Q: {text}");
        assert_eq!(template_from_body("Q: {text}"), "Q: {text}");
        assert_eq!(template_from_body(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }

    #[test]
    fn http_url_joins_cleanly() {
        let store = HttpPromptStore::new("https://prompts.example.com/v1/", None, 5).unwrap();
        assert_eq!(store.url_for("quiz"), "https://prompts.example.com/v1/quiz");
    }
}
