//! Pipeline stages for image and document extraction.
//!
//! ## Data Flow
//!
//! ```text
//!              ┌──────────── document ────────────┐
//! input ──▶ (temp dir) ──▶ render ──▶ extract ──▶ llm ──▶ postprocess
//! (bytes)   page count    (pdfium)   encode    (VLM)    (fences)
//! ```
//!
//! 1. [`input`]: resolve bytes, a path, a URL or a data URI to a buffer
//! 2. [`render`]: page counting and page rasterisation collaborators
//! 3. [`encode`]: MIME sniffing and base64 data-URI wrapping
//! 4. [`llm`]: one logical model call with timeout and retry; the
//!    only stage with network I/O besides URL download
//! 5. [`postprocess`]: strip a code fence the model wrapped its reply in
//! 6. [`extract`]: single-image pipeline tying 1, 3, 4 and 5 together
//! 7. [`document`]: multi-page pipeline fanning pages out through two
//!    [`crate::limiter::ConcurrencyLimit`]s

pub mod document;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
