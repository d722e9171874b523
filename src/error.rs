//! Error types for the edgequake-pdf2mcq library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2McqError`] — **Fatal**: the request cannot produce a quiz at all
//!   (unreadable source, not a PDF, prompt missing, model unreachable, model
//!   output outside the schema). Returned as `Err(Pdf2McqError)` from every
//!   top-level `generate*` function; there are no partial results.
//!
//! * [`PageError`] — **Non-fatal**: text extraction failed for a single page.
//!   The page contributes empty text and the document carries on. These are
//!   collected in [`crate::pipeline::extract::ExtractionReport`] so callers
//!   can see which pages were degraded.

use crate::schema::SchemaViolation;
use crate::storage::ObjectStoreError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2mcq library.
#[derive(Debug, Error)]
pub enum Pdf2McqError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// The document reference is malformed (empty path, bad `scheme://bucket/key`).
    #[error("Invalid document reference '{input}': {reason}")]
    InvalidReference { input: String, reason: String },

    /// Local file does not exist.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// Local file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object-storage collaborator failed (missing object, credentials, network).
    #[error("Failed to fetch '{key}' from bucket '{bucket}': {source}")]
    RemoteFetch {
        bucket: String,
        key: String,
        #[source]
        source: ObjectStoreError,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes are not a parseable PDF container.
    #[error("Document is not a valid PDF: {detail}")]
    MalformedDocument { detail: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The named prompt template could not be fetched or bound.
    #[error("Prompt '{name}' could not be resolved: {detail}")]
    PromptResolution { name: String, detail: String },

    /// The language-model backend is unreachable or rejected the request.
    #[error("Generation backend '{backend}' failed: {detail}")]
    GenerationBackend { backend: String, detail: String },

    /// The model's output could not be coerced to the quiz schema.
    #[error("Generated output violates the quiz schema: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed, or a request parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2McqError {
    /// `true` when the failure was caused by what the caller supplied rather
    /// than by a collaborator or the model.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Pdf2McqError::InvalidReference { .. }
                | Pdf2McqError::NotFound { .. }
                | Pdf2McqError::MalformedDocument { .. }
                | Pdf2McqError::InvalidConfig(_)
        )
    }
}

/// A non-fatal error for a single page.
///
/// The page is replaced with empty text; extraction of the remaining pages
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The PDF backend returned an error for this page.
    #[error("Page {page}: text extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The PDF backend panicked while reading this page.
    #[error("Page {page}: text extraction aborted: {detail}")]
    ExtractionPanicked { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractionFailed { page, .. } | PageError::ExtractionPanicked { page, .. } => {
                *page
            }
        }
    }
}
