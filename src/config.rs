//! Configuration types and fixed defaults for text extraction.
//!
//! The constants below are the library defaults. [`ExtractorConfig`] starts
//! from them and lets embedders override individual knobs through
//! [`ExtractorConfigBuilder`]; `OcrLlm::new` uses the defaults unchanged.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ── Constants ────────────────────────────────────────────────────────────

/// Provider identifiers accepted by [`Provider::from_str`].
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai"];

/// Image MIME types sent to the inference endpoint as-is.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Capacity of each limiter in the document pipeline.
pub const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Per-attempt timeout for the inference call, in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Attempts per logical inference call (first try included).
pub const RETRY_ATTEMPTS: u32 = 3;

/// Base delay between attempts, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1_000;

/// Output token bound sent with every request.
pub const DEFAULT_MAX_TOKENS: usize = 2_000;

/// Timeout for downloading URL inputs, in seconds.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

// ── Provider ─────────────────────────────────────────────────────────────

/// The inference backend to call.
///
/// A closed set: adding a backend means adding a variant and filling in its
/// row of the dispatch methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    /// Canonical identifier, as accepted by [`Provider::from_str`].
    pub fn id(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
        }
    }

    /// Chat-completions endpoint for this provider.
    pub fn endpoint(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }

    /// Vision model used when the config does not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
        }
    }
}

impl FromStr for Provider {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            _ => Err(OcrError::InvalidProvider {
                provider: s.to_string(),
                supported: SUPPORTED_PROVIDERS.join(", "),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// `base × attempt`: 1 s → 2 s with the defaults. (default)
    #[default]
    Linear,
    /// `base × 2^(attempt - 1)`: 1 s → 2 s → 4 s …
    Exponential,
}

impl BackoffStrategy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            BackoffStrategy::Linear => base.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u32.saturating_pow(attempt - 1))
            }
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Raster format written by the page renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            RasterFormat::Png => image::ImageFormat::Png,
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Settings handed to the page renderer for every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Target density in DPI. Default: 300.
    pub density: u32,
    /// Maximum output width in pixels. Default: 2480 (A4 at 300 DPI).
    pub width: u32,
    /// Maximum output height in pixels. Default: 3508 (A4 at 300 DPI).
    pub height: u32,
    /// Output raster format. Default: PNG.
    pub format: RasterFormat,
    /// File stem for rendered pages; page `n` is written as `{stem}.{n}.{ext}`.
    pub save_filename: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            density: 300,
            width: 2480,
            height: 3508,
            format: RasterFormat::Png,
            save_filename: "page".to_string(),
        }
    }
}

impl RenderOptions {
    /// Filename the renderer should produce for `page`.
    pub fn file_name(&self, page: usize) -> String {
        format!("{}.{}.{}", self.save_filename, page, self.format.extension())
    }
}

// ── ExtractorConfig ──────────────────────────────────────────────────────

/// Configuration for an [`crate::OcrLlm`] instance.
///
/// # Example
/// ```rust
/// use ocr_llm::{BackoffStrategy, ExtractorConfig};
///
/// let config = ExtractorConfig::builder()
///     .max_concurrency(8)
///     .max_attempts(5)
///     .backoff(BackoffStrategy::Exponential)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_concurrency, 8);
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    /// Capacity of both document-pipeline limiters. Default: 100.
    pub max_concurrency: usize,

    /// Wall-clock timeout for a single inference attempt. Default: 30 000 ms.
    pub request_timeout_ms: u64,

    /// Attempts per inference call, first try included. Default: 3.
    pub max_attempts: u32,

    /// Base backoff delay between attempts. Default: 1 000 ms.
    pub retry_delay_ms: u64,

    /// Growth of the backoff delay. Default: linear.
    pub backoff: BackoffStrategy,

    /// Model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Endpoint override for OpenAI-compatible gateways. If None, uses the provider endpoint.
    pub endpoint: Option<String>,

    /// Output token bound per request. Default: 2000.
    pub max_tokens: usize,

    /// Custom extraction instruction. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Page rendering settings for documents.
    pub render: RenderOptions,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Parent directory for per-document scratch directories. If None, the system temp dir.
    pub temp_root: Option<PathBuf>,

    /// Receives per-page events from the document pipeline.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: MAX_CONCURRENT_REQUESTS,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            max_attempts: RETRY_ATTEMPTS,
            retry_delay_ms: RETRY_DELAY_MS,
            backoff: BackoffStrategy::default(),
            model: None,
            endpoint: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            prompt: None,
            render: RenderOptions::default(),
            download_timeout_secs: DOWNLOAD_TIMEOUT_SECS,
            temp_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("max_concurrency", &self.max_concurrency)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("backoff", &self.backoff)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("max_tokens", &self.max_tokens)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("render", &self.render)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("temp_root", &self.temp_root)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check the invariants the pipelines rely on.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.max_concurrency == 0 {
            return Err(OcrError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(OcrError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(OcrError::InvalidConfig(
                "request_timeout_ms must be > 0".into(),
            ));
        }
        if !(72..=600).contains(&self.render.density) {
            return Err(OcrError::InvalidConfig(format!(
                "render density must be 72–600 DPI, got {}",
                self.render.density
            )));
        }
        if self.render.save_filename.is_empty() {
            return Err(OcrError::InvalidConfig(
                "render save_filename must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.config.backoff = strategy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn render(mut self, options: RenderOptions) -> Self {
        self.config.render = options;
        self
    }

    pub fn density(mut self, dpi: u32) -> Self {
        self.config.render.density = dpi;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, OcrError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
