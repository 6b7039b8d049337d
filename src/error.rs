//! Error types for the ocr-llm library.
//!
//! Errors fall into two groups that are handled very differently:
//!
//! * **Construction errors** ([`OcrError::InvalidProvider`],
//!   [`OcrError::InvalidConfig`]) are returned as `Err` from
//!   [`crate::OcrLlm::new`] and the config builders. Nothing can run until the
//!   caller fixes them.
//!
//! * **Per-item errors** (everything else) never escape
//!   [`crate::OcrLlm::extract_from_image`] or
//!   [`crate::OcrLlm::extract_from_document`]. Their `Display` text is stored in
//!   [`crate::output::ResultMetadata::error`] so a multi-page document always
//!   comes back complete and page-indexed, even when individual pages fail.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the ocr-llm library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Construction errors ───────────────────────────────────────────────
    /// The provider id is not in [`crate::config::SUPPORTED_PROVIDERS`].
    #[error("Invalid provider: '{provider}' (supported: {supported})")]
    InvalidProvider { provider: String, supported: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The source resolved to an empty or undecodable buffer.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Remote call errors ────────────────────────────────────────────────
    /// Every attempt against the inference endpoint failed.
    #[error("Request to {endpoint} failed after {attempts} attempts: {last_error}")]
    RemoteCallFailure {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    /// The endpoint answered successfully but the reply lacked the expected fields.
    #[error("Unexpected response from {endpoint}: {detail}")]
    ResponseParse { endpoint: String, detail: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The renderer produced no usable image for a page.
    #[error("Failed to render page {page}: {detail}")]
    RenderFailure { page: usize, detail: String },

    /// The document structure could not be parsed.
    #[error("Document is corrupt or not a PDF: {detail}")]
    CorruptDocument { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Runtime errors ────────────────────────────────────────────────────
    /// A task submitted to a [`crate::limiter::ConcurrencyLimit`] panicked.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Unexpected internal error (I/O on scratch files and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        OcrError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Whether the error was raised while building an [`crate::OcrLlm`].
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            OcrError::InvalidProvider { .. } | OcrError::InvalidConfig(_)
        )
    }
}
