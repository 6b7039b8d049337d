//! Multi-page pipeline: render every page, extract every page, reorder.
//!
//! ## Two limiters
//!
//! Rendering is CPU/IO-bound and model calls are network-bound, so each
//! gets its own [`ConcurrencyLimit`]. A render task hands its page to the
//! processing limiter and returns at once, which lets later pages rasterise
//! while earlier ones are still waiting on the model:
//!
//! ```text
//! page 1..=N ─▶ render limit ─▶ renderer ─▶ read + delete file ─┐
//!                                   │ (error)                   ▼
//!                                   ▼                 processing limit ─▶ extract
//!                          synthesized failure                  │
//!                                   └──────────▶ join in page order ◀┘ ─▶ sort
//! ```
//!
//! ## Scratch directory
//!
//! The renderer works on a path, so the document is written to a fresh
//! `ocr-llm-*` temp directory owned by this invocation. It is removed on every
//! exit path: explicitly via [`tempfile::TempDir::close`] (errors are logged)
//! and by the guard's `Drop` if anything unwinds first.

use crate::config::ExtractorConfig;
use crate::error::OcrError;
use crate::limiter::{ConcurrencyLimit, TaskHandle};
use crate::output::PageResult;
use crate::pipeline::extract::process_image_bytes;
use crate::pipeline::input::{self, InputSource};
use crate::pipeline::llm::ExtractionClient;
use crate::pipeline::render::{PageCounter, PageRenderer};
use crate::progress::ProgressCallback;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name of the persisted document inside the scratch directory.
const DOCUMENT_FILE: &str = "document.pdf";

/// Everything one document run needs; cloned cheaply into each task.
#[derive(Clone)]
pub struct DocumentPipeline {
    pub(crate) client: Arc<ExtractionClient>,
    pub(crate) counter: Arc<dyn PageCounter>,
    pub(crate) renderer: Arc<dyn PageRenderer>,
    pub(crate) config: Arc<ExtractorConfig>,
}

/// What a render task leaves behind for its page.
enum PageOutcome {
    /// Render succeeded; extraction is queued on the processing limiter.
    Queued(TaskHandle<PageResult>),
    /// Render failed; the result is already final.
    Ready(PageResult),
}

impl DocumentPipeline {
    pub fn new(
        client: Arc<ExtractionClient>,
        counter: Arc<dyn PageCounter>,
        renderer: Arc<dyn PageRenderer>,
        config: Arc<ExtractorConfig>,
    ) -> Self {
        Self {
            client,
            counter,
            renderer,
            config,
        }
    }

    /// Extract every page of `source`, returning one result per page sorted by page.
    ///
    /// Document-level failures (unreadable source, empty buffer, unparseable
    /// structure) come back as a single failed result for page 1.
    pub async fn process(&self, source: InputSource) -> Vec<PageResult> {
        let start = Instant::now();
        let described = source.describe();
        info!("Starting document extraction: {}", described);

        let results = match self.resolve_and_run(source).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Document {}: {}", described, e);
                vec![PageResult::failure(1, e.to_string())]
            }
        };

        let ok = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Document extraction complete: {}/{} pages in {}ms",
            ok,
            results.len(),
            start.elapsed().as_millis()
        );
        results
    }

    async fn resolve_and_run(&self, source: InputSource) -> Result<Vec<PageResult>, OcrError> {
        let bytes = input::resolve_bytes(source, self.config.download_timeout_secs).await?;
        if bytes.is_empty() {
            return Err(OcrError::invalid_input("empty or invalid PDF buffer"));
        }

        let scratch = self.scratch_dir()?;
        let scratch_path = scratch.path().to_path_buf();
        debug!("Scratch directory: {}", scratch_path.display());

        let result = self.run_in(&scratch_path, bytes).await;

        if let Err(e) = scratch.close() {
            warn!(
                "Failed to remove scratch directory {}: {}",
                scratch_path.display(),
                e
            );
        }
        result
    }

    fn scratch_dir(&self) -> Result<TempDir, OcrError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ocr-llm-");
        match &self.config.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| OcrError::Internal(format!("cannot create scratch directory: {e}")))
    }

    async fn run_in(&self, scratch: &Path, bytes: Vec<u8>) -> Result<Vec<PageResult>, OcrError> {
        let doc_path = scratch.join(DOCUMENT_FILE);
        tokio::fs::write(&doc_path, &bytes)
            .await
            .map_err(|e| OcrError::Internal(format!("cannot write {}: {e}", doc_path.display())))?;

        let counter = Arc::clone(&self.counter);
        let page_count = tokio::task::spawn_blocking(move || counter.page_count(&bytes))
            .await
            .map_err(|e| OcrError::TaskFailed(format!("page count: {e}")))??;
        info!("Document has {} pages", page_count);

        let progress = self.config.progress_callback.clone();
        if let Some(ref cb) = progress {
            cb.on_document_start(page_count);
        }

        let render_limit = ConcurrencyLimit::new(self.config.max_concurrency)?;
        let processing_limit = ConcurrencyLimit::new(self.config.max_concurrency)?;

        let render_handles: Vec<(usize, TaskHandle<PageOutcome>)> = (1..=page_count)
            .map(|page| {
                let task = self.render_task(
                    page,
                    page_count,
                    doc_path.clone(),
                    scratch.to_path_buf(),
                    processing_limit.clone(),
                );
                (page, render_limit.run(task))
            })
            .collect();

        // Awaiting render handles in page order only waits for admission of
        // extraction; the model calls themselves overlap below.
        let mut pending: Vec<(usize, PageOutcome)> = Vec::with_capacity(page_count);
        for (page, handle) in render_handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = OcrError::RenderFailure {
                        page,
                        detail: e.to_string(),
                    };
                    report_failure(&progress, page, page_count, &err.to_string());
                    PageOutcome::Ready(PageResult::failure(page, err.to_string()))
                }
            };
            pending.push((page, outcome));
        }

        let mut results = join_all(pending.into_iter().map(|(page, outcome)| {
            let progress = progress.clone();
            async move {
                match outcome {
                    PageOutcome::Ready(result) => result,
                    PageOutcome::Queued(handle) => match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            let msg = e.to_string();
                            warn!("Page {}: {}", page, msg);
                            report_failure(&progress, page, page_count, &msg);
                            PageResult::failure(page, msg)
                        }
                    },
                }
            }
        }))
        .await;

        results.sort_by_key(|r| r.page);

        if let Some(ref cb) = progress {
            let ok = results.iter().filter(|r| r.is_success()).count();
            cb.on_document_complete(page_count, ok);
        }
        Ok(results)
    }

    /// Render `page`, then queue its extraction on `processing`.
    fn render_task(
        &self,
        page: usize,
        total: usize,
        doc_path: PathBuf,
        out_dir: PathBuf,
        processing: ConcurrencyLimit,
    ) -> impl std::future::Future<Output = PageOutcome> + Send + 'static {
        let renderer = Arc::clone(&self.renderer);
        let client = Arc::clone(&self.client);
        let options = self.config.render.clone();
        let progress = self.config.progress_callback.clone();

        async move {
            let image = match render_to_memory(renderer, &doc_path, page, options, out_dir).await {
                Ok(image) => image,
                Err(e) => {
                    warn!("Page {}: {}", page, e);
                    report_failure(&progress, page, total, &e.to_string());
                    return PageOutcome::Ready(PageResult::failure(page, e.to_string()));
                }
            };

            PageOutcome::Queued(processing.run(async move {
                if let Some(ref cb) = progress {
                    cb.on_page_start(page, total);
                }
                let result = PageResult::from_image(page, process_image_bytes(&client, image).await);
                match &result.metadata.error {
                    None => {
                        if let Some(ref cb) = progress {
                            cb.on_page_complete(page, total, result.content.len());
                        }
                    }
                    Some(e) => report_failure(&progress, page, total, e),
                }
                result
            }))
        }
    }
}

/// Run the renderer for one page, load its output and delete the file.
async fn render_to_memory(
    renderer: Arc<dyn PageRenderer>,
    doc_path: &Path,
    page: usize,
    options: crate::config::RenderOptions,
    out_dir: PathBuf,
) -> Result<Vec<u8>, OcrError> {
    let doc = doc_path.to_path_buf();
    let rendered = tokio::task::spawn_blocking(move || {
        renderer.render_page(&doc, page, &options, &out_dir)
    })
    .await
    .map_err(|e| OcrError::RenderFailure {
        page,
        detail: format!("render task panicked: {e}"),
    })??;

    let image = tokio::fs::read(&rendered)
        .await
        .map_err(|e| OcrError::RenderFailure {
            page,
            detail: format!("cannot read {}: {e}", rendered.display()),
        })?;

    if let Err(e) = tokio::fs::remove_file(&rendered).await {
        warn!("Page {}: failed to delete {}: {}", page, rendered.display(), e);
    }
    debug!("Page {}: rendered {} bytes", page, image.len());
    Ok(image)
}

fn report_failure(progress: &Option<ProgressCallback>, page: usize, total: usize, error: &str) {
    if let Some(cb) = progress {
        cb.on_page_error(page, total, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Provider, RenderOptions};
    use crate::pipeline::llm::tests::{reply, TEST_ENDPOINT};
    use crate::pipeline::llm::{ChatRequest, ContentPart, TransportError, VisionTransport};
    use crate::progress::ExtractionProgressCallback;
    use base64::Engine;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fixed page count, or a corrupt-document error when `None`.
    struct StubCounter(Option<usize>);

    impl PageCounter for StubCounter {
        fn page_count(&self, _document: &[u8]) -> Result<usize, OcrError> {
            self.0.ok_or_else(|| OcrError::CorruptDocument {
                detail: "no xref table".into(),
            })
        }
    }

    /// Writes `PAGE-n` as the raster for page n; fails on `fail_on` and
    /// panics on `panic_on`.
    #[derive(Default)]
    struct StubRenderer {
        fail_on: Option<usize>,
        panic_on: Option<usize>,
        delay: Option<Duration>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PageRenderer for StubRenderer {
        fn render_page(
            &self,
            document: &Path,
            page: usize,
            options: &RenderOptions,
            out_dir: &Path,
        ) -> Result<PathBuf, OcrError> {
            assert!(document.exists(), "document persisted before rendering");
            if self.panic_on == Some(page) {
                panic!("renderer crashed on page {page}");
            }
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on == Some(page) {
                return Err(OcrError::RenderFailure {
                    page,
                    detail: "broken content stream".into(),
                });
            }
            let path = out_dir.join(options.file_name(page));
            std::fs::write(&path, format!("PAGE-{page}")).map_err(|e| OcrError::RenderFailure {
                page,
                detail: e.to_string(),
            })?;
            Ok(path)
        }
    }

    /// Answers with the decoded image text; later pages answer sooner when
    /// `stagger` is set. Panics on the image text `panic_on`.
    #[derive(Default)]
    struct EchoTransport {
        stagger: bool,
        panic_on: Option<&'static str>,
    }

    impl VisionTransport for EchoTransport {
        fn endpoint(&self) -> &str {
            TEST_ENDPOINT
        }

        fn send<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<String, TransportError>> {
            Box::pin(async move {
                let url = request.messages[0]
                    .content
                    .iter()
                    .find_map(|part| match part {
                        ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
                        ContentPart::Text { .. } => None,
                    })
                    .ok_or_else(|| TransportError::Network("no image".into()))?;
                let b64 = url.split_once("base64,").map(|(_, b)| b).unwrap_or_default();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .map_err(|e| TransportError::Network(e.to_string()))?;
                let text = String::from_utf8(bytes).map_err(|e| TransportError::Network(e.to_string()))?;
                if self.panic_on == Some(text.as_str()) {
                    panic!("model client crashed on {text}");
                }
                if self.stagger {
                    let page: u64 = text.trim_start_matches("PAGE-").parse().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(10 * (10 - page.min(10)))).await;
                }
                Ok(reply(&text))
            })
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        started: AtomicUsize,
        completed: AtomicUsize,
        errors: Mutex<Vec<usize>>,
        finished: Mutex<Option<(usize, usize)>>,
    }

    impl ExtractionProgressCallback for RecordingProgress {
        fn on_page_start(&self, _page: usize, _total: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _page: usize, _total: usize, _len: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, page: usize, _total: usize, _error: &str) {
            self.errors.lock().unwrap().push(page);
        }
        fn on_document_complete(&self, total: usize, ok: usize) {
            *self.finished.lock().unwrap() = Some((total, ok));
        }
    }

    fn pipeline(
        pages: Option<usize>,
        renderer: Arc<StubRenderer>,
        stagger: bool,
        config: ExtractorConfig,
    ) -> DocumentPipeline {
        let transport = EchoTransport {
            stagger,
            ..Default::default()
        };
        pipeline_with(pages, renderer, transport, config)
    }

    fn pipeline_with(
        pages: Option<usize>,
        renderer: Arc<StubRenderer>,
        transport: EchoTransport,
        config: ExtractorConfig,
    ) -> DocumentPipeline {
        let client = ExtractionClient::new(Arc::new(transport), Provider::OpenAi, &config);
        DocumentPipeline::new(
            Arc::new(client),
            Arc::new(StubCounter(pages)),
            renderer,
            Arc::new(config),
        )
    }

    fn config_in(root: &Path) -> ExtractorConfig {
        ExtractorConfig::builder()
            .temp_root(root)
            .max_concurrency(3)
            .max_attempts(1)
            .build()
            .unwrap()
    }

    fn scratch_entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn every_page_extracted_in_order() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(Some(4), Arc::default(), false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        let pages: Vec<usize> = results.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
        for r in &results {
            assert_eq!(r.content, format!("PAGE-{}", r.page));
            assert!(r.metadata.error.is_none());
        }
    }

    #[tokio::test]
    async fn reversed_completion_still_sorted() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(Some(8), Arc::default(), true, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(results.len(), 8);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.page, i + 1);
            assert_eq!(r.content, format!("PAGE-{}", i + 1));
        }
    }

    #[tokio::test]
    async fn render_failure_is_isolated_to_its_page() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer {
            fail_on: Some(2),
            ..Default::default()
        });
        let p = pipeline(Some(3), renderer, false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "PAGE-1");
        assert_eq!(results[1].page, 2);
        assert_eq!(results[1].content, "");
        let err = results[1].metadata.error.as_deref().unwrap();
        assert!(err.contains("render page 2"), "got: {err}");
        assert_eq!(results[2].content, "PAGE-3");
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn renderer_panic_and_error_mid_document_still_clean_up() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer {
            fail_on: Some(2),
            panic_on: Some(3),
            ..Default::default()
        });
        let p = pipeline(Some(5), renderer, false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        let summary: Vec<(usize, bool)> = results.iter().map(|r| (r.page, r.is_success())).collect();
        assert_eq!(
            summary,
            vec![(1, true), (2, false), (3, false), (4, true), (5, true)]
        );
        let err = results[2].metadata.error.as_deref().unwrap();
        assert!(err.contains("render task panicked"), "got: {err}");
        assert_eq!(results[2].content, "");
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn extraction_panic_is_reported_to_progress() {
        let root = tempfile::tempdir().unwrap();
        let progress = Arc::new(RecordingProgress::default());
        let config = ExtractorConfig::builder()
            .temp_root(root.path())
            .progress_callback(progress.clone())
            .build()
            .unwrap();
        let transport = EchoTransport {
            panic_on: Some("PAGE-2"),
            ..Default::default()
        };
        let p = pipeline_with(Some(3), Arc::default(), transport, config);

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(results.len(), 3);
        assert!(!results[1].is_success());
        assert!(results[1].metadata.error.as_deref().unwrap().contains("Task failed"));
        assert_eq!(*progress.errors.lock().unwrap(), vec![2]);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 2);
        assert_eq!(*progress.finished.lock().unwrap(), Some((3, 2)));
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn render_concurrency_is_bounded() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let config = ExtractorConfig::builder()
            .temp_root(root.path())
            .max_concurrency(2)
            .build()
            .unwrap();
        let p = pipeline(Some(6), Arc::clone(&renderer), false, config);

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(results.len(), 6);
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn scratch_directory_removed_after_success() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(Some(2), Arc::default(), false, config_in(root.path()));

        p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn corrupt_document_yields_single_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(None, Arc::default(), false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"garbage".to_vec())).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page, 1);
        assert_eq!(results[0].content, "");
        assert!(results[0].metadata.error.as_deref().unwrap().contains("no xref"));
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn empty_buffer_is_rejected_without_scratch() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(Some(1), Arc::default(), false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(Vec::new())).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].metadata.error.as_deref().unwrap().contains("empty"));
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn zero_page_document_yields_no_results() {
        let root = tempfile::tempdir().unwrap();
        let p = pipeline(Some(0), Arc::default(), false, config_in(root.path()));

        let results = p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn progress_events_cover_every_page() {
        let root = tempfile::tempdir().unwrap();
        let progress = Arc::new(RecordingProgress::default());
        let config = ExtractorConfig::builder()
            .temp_root(root.path())
            .progress_callback(progress.clone())
            .build()
            .unwrap();
        let renderer = Arc::new(StubRenderer {
            fail_on: Some(3),
            ..Default::default()
        });
        let p = pipeline(Some(4), renderer, false, config);

        p.process(InputSource::Bytes(b"%PDF-1.7".to_vec())).await;

        assert_eq!(progress.started.load(Ordering::SeqCst), 3);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 3);
        assert_eq!(*progress.errors.lock().unwrap(), vec![3]);
        assert_eq!(*progress.finished.lock().unwrap(), Some((4, 3)));
    }
}
