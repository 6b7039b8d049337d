//! Public entry point: [`OcrLlm`].
//!
//! An `OcrLlm` is built once per provider and API key and then shared. It is
//! cheap to clone; clones share the HTTP client, the configuration and the
//! PDF backend.
//!
//! ```rust,no_run
//! use ocr_llm::OcrLlm;
//!
//! # async fn run() -> Result<(), ocr_llm::OcrError> {
//! let ocr = OcrLlm::new("openai", std::env::var("OPENAI_API_KEY").unwrap_or_default())?;
//!
//! let receipt = ocr.extract_from_image("receipt.jpg").await;
//! println!("{}", receipt.content);
//!
//! for page in ocr.extract_from_document("contract.pdf").await {
//!     println!("--- page {} ---\n{}", page.page, page.content);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::{ExtractorConfig, Provider};
use crate::error::OcrError;
use crate::output::{ImageResult, PageResult};
use crate::pipeline::document::DocumentPipeline;
use crate::pipeline::extract;
use crate::pipeline::input::InputSource;
use crate::pipeline::llm::{ExtractionClient, HttpTransport, VisionTransport};
use crate::pipeline::render::{PageCounter, PageRenderer, PdfiumRenderer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Text extraction from images and PDF documents through a vision model.
#[derive(Clone)]
pub struct OcrLlm {
    provider: Provider,
    config: Arc<ExtractorConfig>,
    client: Arc<ExtractionClient>,
    documents: DocumentPipeline,
}

impl fmt::Debug for OcrLlm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrLlm")
            .field("provider", &self.provider)
            .field("endpoint", &self.client.endpoint())
            .field("config", &self.config)
            .finish()
    }
}

impl OcrLlm {
    /// Create an extractor with default settings.
    ///
    /// Fails with [`OcrError::InvalidProvider`] when `provider` is not one of
    /// [`crate::config::SUPPORTED_PROVIDERS`], and with
    /// [`OcrError::InvalidConfig`] when `api_key` is blank.
    pub fn new(provider: &str, api_key: impl Into<String>) -> Result<Self, OcrError> {
        Self::builder(provider, api_key).build()
    }

    /// Start a builder for a customised extractor.
    pub fn builder(provider: &str, api_key: impl Into<String>) -> OcrLlmBuilder {
        OcrLlmBuilder {
            provider: provider.to_string(),
            api_key: api_key.into(),
            config: None,
            transport: None,
            renderer: None,
            counter: None,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the text of one image.
    ///
    /// Accepts raw bytes, a path, an `http(s)` URL or a `data:` URI. Never
    /// fails: errors are reported in `metadata.error` with empty content.
    pub async fn extract_from_image(&self, source: impl Into<InputSource>) -> ImageResult {
        extract::process_image(&self.client, source.into(), self.config.download_timeout_secs)
            .await
    }

    /// Extract the text of every page of a PDF.
    ///
    /// Results are sorted by page and hold exactly one entry per page. A
    /// document that cannot be opened at all yields a single failed entry for
    /// page 1.
    pub async fn extract_from_document(&self, source: impl Into<InputSource>) -> Vec<PageResult> {
        self.documents.process(source.into()).await
    }
}

/// Builder for [`OcrLlm`].
///
/// The transport and PDF backend are replaceable, mainly so that the
/// scheduling can be driven without network access or a pdfium library.
pub struct OcrLlmBuilder {
    provider: String,
    api_key: String,
    config: Option<ExtractorConfig>,
    transport: Option<Arc<dyn VisionTransport>>,
    renderer: Option<Arc<dyn PageRenderer>>,
    counter: Option<Arc<dyn PageCounter>>,
}

impl OcrLlmBuilder {
    pub fn config(mut self, config: ExtractorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Send model requests through `transport` instead of HTTPS.
    pub fn transport(mut self, transport: Arc<dyn VisionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Rasterise pages with `renderer` instead of pdfium.
    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Count pages with `counter` instead of pdfium.
    pub fn page_counter(mut self, counter: Arc<dyn PageCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn build(self) -> Result<OcrLlm, OcrError> {
        let provider: Provider = self.provider.parse()?;
        if self.api_key.trim().is_empty() {
            return Err(OcrError::InvalidConfig("API key must not be empty".into()));
        }
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport: Arc<dyn VisionTransport> = match self.transport {
            Some(t) => t,
            None => {
                let endpoint = config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| provider.endpoint().to_string());
                Arc::new(HttpTransport::new(endpoint, self.api_key)?)
            }
        };

        let pdfium = Arc::new(PdfiumRenderer::new());
        let renderer: Arc<dyn PageRenderer> = match self.renderer {
            Some(r) => r,
            None => pdfium.clone(),
        };
        let counter: Arc<dyn PageCounter> = match self.counter {
            Some(c) => c,
            None => pdfium,
        };

        let client = Arc::new(ExtractionClient::new(transport, provider, &config));
        let config = Arc::new(config);
        let documents = DocumentPipeline::new(
            Arc::clone(&client),
            counter,
            renderer,
            Arc::clone(&config),
        );

        info!("Initialised {} extractor against {}", provider, client.endpoint());
        debug!("Extractor config: {:?}", config);
        Ok(OcrLlm {
            provider,
            config,
            client,
            documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let err = OcrLlm::new("invalid", "sk-test").unwrap_err();
        assert!(matches!(err, OcrError::InvalidProvider { .. }));
        assert!(err.to_string().contains("invalid"));
        assert!(err.is_construction_error());
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let err = OcrLlm::new("openai", "  ").unwrap_err();
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ExtractorConfig::default();
        config.max_concurrency = 0;
        let err = OcrLlm::builder("openai", "sk-test")
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let ocr = OcrLlm::new("openai", "sk-very-secret").unwrap();
        let dbg = format!("{ocr:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(dbg.contains("api.openai.com"));
        assert_eq!(ocr.provider(), Provider::OpenAi);
    }
}
