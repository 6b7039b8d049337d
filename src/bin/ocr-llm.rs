//! CLI binary for ocr-llm.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractorConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr_llm::{
    BackoffStrategy, ExtractionProgressCallback, ExtractorConfig, OcrLlm, PageResult,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per page. Pages finish out of order, so
/// per-page start times are keyed by page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_document_start` reports the page count.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page, Instant::now());
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total: usize, content_len: usize) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{content_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe a receipt
  ocr-llm receipt.jpg

  # Every page of a PDF, into a file
  ocr-llm contract.pdf -o contract.md

  # Remote image, JSON result
  ocr-llm https://example.com/scan.png --json

  # Gentler on rate limits
  ocr-llm --concurrency 4 --exponential-backoff book.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY     API key for the openai provider
  OCR_LLM_PROVIDER   Provider id (default: openai)
  OCR_LLM_MODEL      Override model ID
  PDFIUM_LIB_PATH    Path to libpdfium (file or directory), for documents
  RUST_LOG           Override the log filter
"#;

/// Extract text from images and PDFs with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-llm",
    version,
    about = "Extract text from images and PDFs with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local path, HTTP/HTTPS URL or data URI.
    input: String,

    /// Treat the input as an image or a document (auto: by `.pdf` suffix).
    #[arg(long, value_enum, default_value = "auto")]
    kind: KindArg,

    /// Model provider.
    #[arg(long, env = "OCR_LLM_PROVIDER", default_value = "openai")]
    provider: String,

    /// Provider API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Model ID (default: the provider's default vision model).
    #[arg(long, env = "OCR_LLM_MODEL")]
    model: Option<String>,

    /// Concurrent renders and concurrent model calls (each).
    #[arg(short, long, env = "OCR_LLM_CONCURRENCY", default_value_t = ocr_llm::MAX_CONCURRENT_REQUESTS)]
    concurrency: usize,

    /// Per-attempt model call timeout in milliseconds.
    #[arg(long, env = "OCR_LLM_TIMEOUT_MS", default_value_t = ocr_llm::REQUEST_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Attempts per model call.
    #[arg(long, env = "OCR_LLM_MAX_ATTEMPTS", default_value_t = ocr_llm::RETRY_ATTEMPTS)]
    max_attempts: u32,

    /// Base delay between attempts in milliseconds.
    #[arg(long, env = "OCR_LLM_RETRY_DELAY_MS", default_value_t = ocr_llm::RETRY_DELAY_MS)]
    retry_delay_ms: u64,

    /// Double the delay after each attempt instead of growing it linearly.
    #[arg(long)]
    exponential_backoff: bool,

    /// Rendering DPI for document pages (72–600).
    #[arg(long, env = "OCR_LLM_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Write the text to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the structured results as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    Auto,
    Image,
    Document,
}

impl KindArg {
    fn is_document(self, input: &str) -> bool {
        match self {
            KindArg::Image => false,
            KindArg::Document => true,
            KindArg::Auto => looks_like_pdf(input),
        }
    }
}

fn looks_like_pdf(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return lower.starts_with("data:application/pdf");
    }
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".pdf")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let document = cli.kind.is_document(&cli.input);

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = document && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress)?;
    let ocr = OcrLlm::builder(&cli.provider, cli.api_key.clone())
        .config(config)
        .build()
        .context("Failed to initialise extractor")?;

    let started = Instant::now();
    let pages: Vec<PageResult> = if document {
        ocr.extract_from_document(cli.input.as_str()).await
    } else {
        vec![PageResult::from_image(1, ocr.extract_from_image(cli.input.as_str()).await)]
    };

    let rendered = if cli.json {
        if document {
            serde_json::to_string_pretty(&pages)
        } else {
            serde_json::to_string_pretty(&pages[0])
        }
        .context("Failed to serialise results")?
    } else {
        join_pages(&pages, document)
    };

    match cli.output {
        Some(ref path) => tokio::fs::write(path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    let failed: Vec<&PageResult> = pages.iter().filter(|p| !p.is_success()).collect();
    if !cli.quiet {
        for p in &failed {
            if let Some(ref e) = p.metadata.error {
                eprintln!("{} page {}: {}", red("✗"), p.page, e);
            }
        }
        let ok = pages.len() - failed.len();
        eprintln!(
            "{} {}/{} {} in {}ms",
            if failed.is_empty() { green("✔") } else { red("⚠") },
            bold(&ok.to_string()),
            pages.len(),
            if document { "pages" } else { "images" },
            started.elapsed().as_millis(),
        );
    }

    if !pages.is_empty() && failed.len() == pages.len() {
        anyhow::bail!("Extraction failed for every item");
    }
    Ok(())
}

/// Map CLI args to `ExtractorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractorConfig> {
    let mut builder = ExtractorConfig::builder()
        .max_concurrency(cli.concurrency)
        .request_timeout_ms(cli.timeout_ms)
        .max_attempts(cli.max_attempts)
        .retry_delay_ms(cli.retry_delay_ms)
        .density(cli.dpi);

    if cli.exponential_backoff {
        builder = builder.backoff(BackoffStrategy::Exponential);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Concatenate page texts; documents get a marker before each page.
fn join_pages(pages: &[PageResult], document: bool) -> String {
    if !document {
        return pages.first().map(|p| p.content.clone()).unwrap_or_default();
    }
    pages
        .iter()
        .map(|p| format!("<!-- page {} -->\n{}", p.page, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_detection() {
        assert!(looks_like_pdf("report.PDF"));
        assert!(looks_like_pdf("https://host/a.pdf?sig=1"));
        assert!(looks_like_pdf("data:application/pdf;base64,JVBERi0="));
        assert!(!looks_like_pdf("scan.png"));
        assert!(!looks_like_pdf("data:image/png;base64,AAAA"));
    }

    #[test]
    fn explicit_kind_wins() {
        assert!(KindArg::Document.is_document("scan.png"));
        assert!(!KindArg::Image.is_document("file.pdf"));
    }
}
