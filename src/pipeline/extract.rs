//! Text extraction: PDF bytes → plain text, tolerant of per-page failures.
//!
//! ## Partial-failure policy
//!
//! Documents commonly mix native-text pages with scanned ones, or carry a
//! single page whose content stream the parser cannot digest. A failure on one
//! page therefore never aborts the document: that page contributes an empty
//! string, a [`PageError`] is recorded, and the remaining pages carry on.
//! Only a buffer that is not a PDF container at all is fatal
//! ([`Pdf2McqError::MalformedDocument`]).
//!
//! ## Output shape
//!
//! Page texts are joined in document order with a blank line (`"\n\n"`)
//! between them and the whole is trimmed. If nothing is left, the fixed
//! [`EMPTY_DOCUMENT_SENTINEL`] is returned instead so the prompt never
//! receives an empty document variable.
//!
//! ## Why spawn_blocking?
//!
//! Parsing and decoding content streams is CPU-bound; it runs on tokio's
//! blocking pool so async worker threads keep serving other requests.

use crate::error::{PageError, Pdf2McqError};
use lopdf::Document;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Substituted when a document yields no extractable text at all.
pub const EMPTY_DOCUMENT_SENTINEL: &str = "[PDF text could not be extracted or is empty.]";

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// How far into the buffer the `%PDF-` header may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Extracted document text; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Trim `text`, substituting the sentinel when nothing is left.
    pub fn new(text: impl AsRef<str>) -> Self {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            ExtractedText(EMPTY_DOCUMENT_SENTINEL.to_string())
        } else {
            ExtractedText(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// `true` when no page produced any text and the sentinel stands in.
    pub fn is_sentinel(&self) -> bool {
        self.0 == EMPTY_DOCUMENT_SENTINEL
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExtractedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Full result of an extraction: the text plus which pages degraded.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub text: ExtractedText,
    pub page_count: usize,
    pub page_errors: Vec<PageError>,
}

impl ExtractionReport {
    pub fn failed_pages(&self) -> usize {
        self.page_errors.len()
    }
}

/// Extract the text of a PDF held in memory.
pub async fn extract(pdf_bytes: Vec<u8>) -> Result<ExtractedText, Pdf2McqError> {
    extract_report(pdf_bytes).await.map(|r| r.text)
}

/// Like [`extract`], also reporting page count and per-page failures.
pub async fn extract_report(pdf_bytes: Vec<u8>) -> Result<ExtractionReport, Pdf2McqError> {
    tokio::task::spawn_blocking(move || extract_report_blocking(&pdf_bytes))
        .await
        .map_err(|e| Pdf2McqError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_report`].
pub fn extract_report_blocking(pdf_bytes: &[u8]) -> Result<ExtractionReport, Pdf2McqError> {
    check_header(pdf_bytes)?;

    let document = Document::load_mem(pdf_bytes).map_err(|e| Pdf2McqError::MalformedDocument {
        detail: e.to_string(),
    })?;

    // BTreeMap keyed by 1-indexed page number: iteration is document order.
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let page_count = page_numbers.len();
    info!("PDF loaded: {} pages", page_count);

    let pages = page_numbers
        .iter()
        .map(|&n| extract_page(&document, n));

    let (text, page_errors) = join_pages(pages);

    if !page_errors.is_empty() {
        warn!(
            "{}/{} pages yielded no text because extraction failed",
            page_errors.len(),
            page_count
        );
    }
    if text.is_sentinel() {
        warn!("No extractable text in document; using sentinel");
    }

    Ok(ExtractionReport {
        text,
        page_count,
        page_errors,
    })
}

/// Extract one page, converting both errors and panics into a [`PageError`].
fn extract_page(document: &Document, page_number: u32) -> Result<String, PageError> {
    let page = page_number as usize;
    // lopdf may panic on hostile content streams; that must stay page-local.
    match panic::catch_unwind(AssertUnwindSafe(|| document.extract_text(&[page_number]))) {
        Ok(Ok(text)) => {
            debug!("Page {}: {} chars", page, text.len());
            Ok(text)
        }
        Ok(Err(e)) => Err(PageError::ExtractionFailed {
            page,
            detail: e.to_string(),
        }),
        Err(payload) => Err(PageError::ExtractionPanicked {
            page,
            detail: panic_message(payload.as_ref()),
        }),
    }
}

/// Join per-page results in order, substituting `""` for failed pages.
///
/// Returns the trimmed, blank-line-joined text (or the sentinel) and the
/// failures that were absorbed.
pub fn join_pages<I>(pages: I) -> (ExtractedText, Vec<PageError>)
where
    I: IntoIterator<Item = Result<String, PageError>>,
{
    let mut texts = Vec::new();
    let mut errors = Vec::new();

    for result in pages {
        match result {
            Ok(text) => texts.push(text),
            Err(e) => {
                warn!("{}", e);
                errors.push(e);
                texts.push(String::new());
            }
        }
    }

    (ExtractedText::new(texts.join(PAGE_SEPARATOR)), errors)
}

fn check_header(bytes: &[u8]) -> Result<(), Pdf2McqError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Ok(());
    }
    let head: Vec<u8> = bytes.iter().take(8).copied().collect();
    Err(Pdf2McqError::MalformedDocument {
        detail: format!("missing %PDF- header (first bytes: {:?})", head),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while decoding page".to_string()
    }
}
