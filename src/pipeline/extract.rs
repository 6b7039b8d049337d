//! Single-image pipeline: source → bytes → data URI → model → text.
//!
//! Both entry points always return an [`ImageResult`]. Any failure along the
//! way is logged and folded into `metadata.error` with empty content, so
//! callers never need a `match` on `Result` to get a well-formed record.

use crate::error::OcrError;
use crate::output::ImageResult;
use crate::pipeline::input::{self, InputSource};
use crate::pipeline::llm::ExtractionClient;
use crate::pipeline::{encode, postprocess};
use tracing::{debug, warn};

/// Resolve `source` and extract its text.
pub async fn process_image(
    client: &ExtractionClient,
    source: InputSource,
    download_timeout_secs: u64,
) -> ImageResult {
    let described = source.describe();
    let bytes = match input::resolve_bytes(source, download_timeout_secs).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Image {}: {}", described, e);
            return ImageResult::failure(e.to_string());
        }
    };
    process_image_bytes(client, bytes).await
}

/// Extract the text of an in-memory image.
pub async fn process_image_bytes(client: &ExtractionClient, bytes: Vec<u8>) -> ImageResult {
    match try_extract(client, &bytes).await {
        Ok(content) => {
            debug!("Extracted {} chars from {} byte image", content.len(), bytes.len());
            ImageResult::success(content, bytes.len())
        }
        Err(e) => {
            warn!("Image extraction failed: {}", e);
            ImageResult::failure(e.to_string())
        }
    }
}

async fn try_extract(client: &ExtractionClient, bytes: &[u8]) -> Result<String, OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::invalid_input("empty or invalid image buffer"));
    }
    let data_uri = encode::to_data_uri(bytes);
    let raw = client.extract_text(data_uri).await?;
    Ok(postprocess::strip_code_fences(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractorConfig, Provider};
    use crate::pipeline::llm::tests::{reply, ScriptedTransport};
    use crate::pipeline::llm::TransportError;
    use std::sync::Arc;

    fn client_with(transport: Arc<ScriptedTransport>) -> ExtractionClient {
        ExtractionClient::new(transport, Provider::OpenAi, &ExtractorConfig::default())
    }

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n0000";

    #[tokio::test]
    async fn empty_buffer_yields_error_metadata() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply("never"))]));
        let result = process_image_bytes(&client_with(Arc::clone(&transport)), Vec::new()).await;

        assert_eq!(result.content, "");
        let err = result.metadata.error.expect("error recorded");
        assert!(!err.is_empty());
        assert!(err.contains("empty"), "got: {err}");
        assert_eq!(transport.calls(), 0, "no request for an empty buffer");
    }

    #[tokio::test]
    async fn success_records_size_and_strips_fences() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply(
            "```markdown\n# Invoice 42\n```",
        ))]));
        let result = process_image_bytes(&client_with(transport), PNG_MAGIC.to_vec()).await;

        assert_eq!(result.content, "# Invoice 42");
        assert_eq!(result.metadata.size, Some(PNG_MAGIC.len()));
        assert!(result.metadata.error.is_none());
        assert!(!result.metadata.timestamp.is_empty());
    }

    #[tokio::test]
    async fn same_bytes_give_same_content() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply("stable text"))]));
        let client = client_with(transport);

        let first = process_image_bytes(&client, PNG_MAGIC.to_vec()).await;
        let second = process_image_bytes(&client, PNG_MAGIC.to_vec()).await;
        assert_eq!(first.content, second.content);
        assert_eq!(first.content, "stable text");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_is_captured_not_raised() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 500,
            body: "boom".into(),
        })]));
        let result = process_image_bytes(&client_with(transport), PNG_MAGIC.to_vec()).await;

        assert_eq!(result.content, "");
        assert_eq!(result.metadata.size, None);
        let err = result.metadata.error.expect("error recorded");
        assert!(err.contains("3 attempts"), "got: {err}");
    }

    #[tokio::test]
    async fn unresolvable_source_is_captured() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply("never"))]));
        let result = process_image(
            &client_with(transport),
            InputSource::parse("/no/such/scan.png"),
            5,
        )
        .await;
        assert_eq!(result.content, "");
        assert!(result.metadata.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn data_uri_source_is_decoded() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply("from data uri"))]));
        let result = process_image(
            &client_with(transport),
            InputSource::parse("data:image/png;base64,iVBORw0KGgo="),
            5,
        )
        .await;
        assert_eq!(result.content, "from data uri");
        assert_eq!(result.metadata.size, Some(8));
    }
}
