//! Document collaborators: page counting and page rasterisation.
//!
//! The document pipeline only needs two things from a PDF backend: how many
//! pages there are, and a raster file for page `n`. Both sit behind traits so
//! the pipeline's scheduling can be exercised without a PDF engine; the
//! production implementation is [`PdfiumRenderer`].
//!
//! ## Why blocking traits?
//!
//! pdfium is a C++ library with internal thread-local state; it is not
//! async-safe. The pipeline calls these traits inside
//! `tokio::task::spawn_blocking`, so implementations are free to block.
//!
//! With the `thread_safe` feature every bound `Pdfium` holds a process-wide
//! lock until it is dropped. [`PdfiumRenderer`] binds once per call, so its
//! renders run one at a time whatever the render limit is; the limit only
//! buys parallelism for backends that can render concurrently.

use crate::config::RenderOptions;
use crate::error::OcrError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reports how many pages a document has.
pub trait PageCounter: Send + Sync {
    fn page_count(&self, document: &[u8]) -> Result<usize, OcrError>;
}

/// Rasterises a single page of a document to a file.
pub trait PageRenderer: Send + Sync {
    /// Render `page` (1-indexed) of the document at `document` into `out_dir`
    /// and return the path of the written image.
    ///
    /// The caller reads and deletes the file; implementations must not reuse
    /// it across calls.
    fn render_page(
        &self,
        document: &Path,
        page: usize,
        options: &RenderOptions,
        out_dir: &Path,
    ) -> Result<PathBuf, OcrError>;
}

/// pdfium-backed implementation of both collaborators.
///
/// Binds to the library on every call. Binding is cheap next to rendering a
/// 300 DPI page, and it keeps the type `Send + Sync` without holding a
/// `Pdfium` across threads.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Use the library named by `PDFIUM_LIB_PATH`, or the system one.
    pub fn new() -> Self {
        Self {
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Use the library at `path` (a file, or a directory holding the
    /// platform's default library name).
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageCounter for PdfiumRenderer {
    fn page_count(&self, document: &[u8]) -> Result<usize, OcrError> {
        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| OcrError::CorruptDocument {
                detail: format!("{e:?}"),
            })?;
        let count = doc.pages().len() as usize;
        debug!("PDF has {} pages", count);
        Ok(count)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        document: &Path,
        page: usize,
        options: &RenderOptions,
        out_dir: &Path,
    ) -> Result<PathBuf, OcrError> {
        let render_err = |detail: String| OcrError::RenderFailure { page, detail };

        if page == 0 {
            return Err(render_err("pages are 1-indexed".into()));
        }

        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| render_err(format!("{e:?}")))?;

        let pages = doc.pages();
        let total = pages.len() as usize;
        if page > total {
            return Err(render_err(format!("document has only {total} pages")));
        }

        let pdf_page = pages
            .get((page - 1) as u16)
            .map_err(|e| render_err(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.density as f32 / 72.0)
            .set_maximum_width(options.width as i32)
            .set_maximum_height(options.height as i32);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| render_err(format!("{e:?}")))?;

        let image = bitmap.as_image();
        let out_path = out_dir.join(options.file_name(page));
        image
            .save_with_format(&out_path, options.format.image_format())
            .map_err(|e| render_err(format!("cannot write {}: {e}", out_path.display())))?;

        debug!(
            "Rendered page {} → {}x{} px at {}",
            page,
            image.width(),
            image.height(),
            out_path.display()
        );
        Ok(out_path)
    }
}
