//! # edgequake-pdf2mcq
//!
//! Turn a PDF into a bounded set of validated multiple-choice questions using
//! a language model constrained to a strict output schema.
//!
//! ## Why this crate?
//!
//! Asking a chat model for "ten quiz questions about this PDF" is easy; getting
//! back something a program can rely on is not. Models wrap JSON in prose,
//! return three options instead of four, or point `correct_index` past the end
//! of the list. This crate treats the model as an unreliable step: every reply
//! is cleaned, checked against the schema, and either accepted whole or
//! rejected with a typed error naming the offending field.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DocumentReference (bytes | local path | scheme://bucket/key)
//!  │
//!  ├─ 1. Resolve   read the file or fetch the object (S3 or injected store)
//!  ├─ 2. Extract   per-page text via lopdf (CPU-bound, spawn_blocking);
//!  │               a failing page contributes "" and the rest carry on
//!  ├─ 3. Prompt    pull the named template, bind text under every alias
//!  ├─ 4. Generate  schema-constrained chat completion, re-asked on bad JSON
//!  └─ 5. Validate  1–10 items, 4 options each, correct_index in 0..4
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2mcq::{generate, DocumentReference, GenerationConfig, MaxQuestions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = GenerationConfig::default();
//!     let quiz = generate(
//!         DocumentReference::parse("s3://lectures/cardiology/heart.pdf")?,
//!         Some(MaxQuestions::new(5)?),
//!         &config,
//!     )
//!     .await?;
//!     for item in quiz.items() {
//!         println!("{} → {}", item.question, item.correct_option());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2mcq` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2mcq = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod pipeline;
pub mod progress;
pub mod prompt_store;
pub mod prompts;
pub mod schema;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GenerationConfig, GenerationConfigBuilder};
pub use error::{PageError, Pdf2McqError};
pub use generate::{extract_only, generate, generate_sync, generate_to_file, write_json_file, Pipeline};
pub use pipeline::extract::{ExtractedText, ExtractionReport, EMPTY_DOCUMENT_SENTINEL};
pub use pipeline::input::{DocumentReference, RemoteLocation};
pub use pipeline::llm::{BackendError, GenerationBackend, GenerationRequest, LlmBackend};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use prompt_store::{DirPromptStore, HttpPromptStore, PromptStore, StaticPromptStore};
pub use schema::{GenerationResult, MaxQuestions, McqItem, SchemaViolation};
pub use storage::{ObjectStore, ObjectStoreError, S3ObjectStore};
