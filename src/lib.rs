//! # ocr-llm
//!
//! Extract text from images and PDF documents with a vision-capable LLM.
//!
//! ## Why this crate?
//!
//! Classic OCR engines struggle with receipts, handwriting, tables and
//! multi-column layouts. Instead this crate sends each image (or each
//! rasterised PDF page) to a vision model with a fixed transcription
//! instruction and returns the Markdown it writes back, page by page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image ─────────────────────────────┐
//!                                    ▼
//! PDF ─▶ temp dir ─▶ page count ─▶ render ─▶ encode ─▶ model ─▶ strip fences
//!                     (pdfium)    (limit N)  data URI (limit N,   │
//!                                                    retry)       ▼
//!                                                     results sorted by page
//! ```
//!
//! Every model call runs under a timeout and is retried with back-off. Pages
//! are rendered and extracted concurrently under two independent
//! [`ConcurrencyLimit`]s. Failures never abort a run: they are recorded in the
//! result's [`ResultMetadata::error`] with empty content.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_llm::{ExtractorConfig, OcrLlm};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::builder().max_concurrency(8).build()?;
//!     let ocr = OcrLlm::builder("openai", std::env::var("OPENAI_API_KEY")?)
//!         .config(config)
//!         .build()?;
//!
//!     for page in ocr.extract_from_document("scan.pdf").await {
//!         match page.metadata.error {
//!             None => println!("{}", page.content),
//!             Some(e) => eprintln!("page {} failed: {e}", page.page),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-llm` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr-llm = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF backend
//!
//! Documents are rasterised with pdfium. The library is looked up at
//! `PDFIUM_LIB_PATH` (a file or a directory) and otherwise in the system
//! library path. Image extraction does not need pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extractor;
pub mod limiter;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BackoffStrategy, ExtractorConfig, ExtractorConfigBuilder, Provider, RasterFormat,
    RenderOptions, MAX_CONCURRENT_REQUESTS, REQUEST_TIMEOUT_MS, RETRY_ATTEMPTS, RETRY_DELAY_MS,
    SUPPORTED_IMAGE_TYPES, SUPPORTED_PROVIDERS,
};
pub use error::OcrError;
pub use extractor::{OcrLlm, OcrLlmBuilder};
pub use limiter::{ConcurrencyLimit, TaskHandle};
pub use output::{ImageResult, PageResult, ResultMetadata};
pub use pipeline::input::InputSource;
pub use pipeline::llm::{ChatRequest, HttpTransport, TransportError, VisionTransport};
pub use pipeline::render::{PageCounter, PageRenderer, PdfiumRenderer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
