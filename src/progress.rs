//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as a request moves through resolve → extract → generate.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a WebSocket or a terminal
//! spinner without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because one pipeline may serve
//! many concurrent requests.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2mcq::{GenerationConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StderrCallback;
//!
//! impl PipelineProgressCallback for StderrCallback {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("{stage}…");
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(StderrCallback) as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The three stages of a pipeline run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fetching the document bytes.
    Resolve,
    /// Extracting text from the PDF.
    Extract,
    /// Prompting the model and validating its reply.
    Generate,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Resolve => "Resolving document",
            Stage::Extract => "Extracting text",
            Stage::Generate => "Generating questions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as each stage starts and finishes.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stage events of concurrent runs on one pipeline may
/// interleave.
pub trait PipelineProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage succeeds. Not called for the failing stage.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called for each page whose text could not be extracted.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages in the document
    /// * `error`       — human-readable error description
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after a successful run with the number of items produced.
    fn on_pipeline_complete(&self, item_count: usize) {
        let _ = item_count;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
