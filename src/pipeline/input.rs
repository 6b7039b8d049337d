//! Input resolution: turn whatever the caller handed us into a byte buffer.
//!
//! Sources are resolved exactly once, at pipeline entry. After that every
//! stage works on the in-memory buffer the pipeline owns for the duration of
//! the call; nothing is shared beyond it.

use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A source image or document, in any of the supported encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Raw bytes already in memory.
    Bytes(Vec<u8>),
    /// A local file.
    Path(PathBuf),
    /// An `http://` or `https://` URL to download.
    Url(String),
    /// A `data:<mime>;base64,<payload>` URI.
    DataUri(String),
}

impl InputSource {
    /// Classify a caller-supplied string.
    ///
    /// `data:` → data URI, `http://` / `https://` → URL, anything else is
    /// treated as a local path.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if is_data_uri(trimmed) {
            InputSource::DataUri(trimmed.to_string())
        } else if is_url(trimmed) {
            InputSource::Url(trimmed.to_string())
        } else {
            InputSource::Path(PathBuf::from(trimmed))
        }
    }

    /// Short description for logs; never includes payload bytes.
    pub fn describe(&self) -> String {
        match self {
            InputSource::Bytes(b) => format!("<{} bytes>", b.len()),
            InputSource::Path(p) => p.display().to_string(),
            InputSource::Url(u) => u.clone(),
            InputSource::DataUri(d) => format!("<data uri, {} chars>", d.len()),
        }
    }
}

impl From<&str> for InputSource {
    fn from(input: &str) -> Self {
        InputSource::parse(input)
    }
}

impl From<String> for InputSource {
    fn from(input: String) -> Self {
        InputSource::parse(&input)
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

impl From<&[u8]> for InputSource {
    fn from(bytes: &[u8]) -> Self {
        InputSource::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for InputSource {
    fn from(path: PathBuf) -> Self {
        InputSource::Path(path)
    }
}

impl From<&Path> for InputSource {
    fn from(path: &Path) -> Self {
        InputSource::Path(path.to_path_buf())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is a data URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

/// Resolve `source` into an owned byte buffer.
///
/// Emptiness is not checked here; the pipelines reject empty buffers with
/// their own message so the error says what kind of input was empty.
pub async fn resolve_bytes(
    source: InputSource,
    download_timeout_secs: u64,
) -> Result<Vec<u8>, OcrError> {
    match source {
        InputSource::Bytes(bytes) => Ok(bytes),
        InputSource::Path(path) => read_local(&path).await,
        InputSource::Url(url) => download_url(&url, download_timeout_secs).await,
        InputSource::DataUri(uri) => decode_data_uri(&uri),
    }
}

/// Read a local file, mapping the common failure kinds to specific errors.
async fn read_local(path: &Path) -> Result<Vec<u8>, OcrError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(OcrError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(OcrError::invalid_input(format!(
            "cannot read '{}': {e}",
            path.display()
        ))),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, OcrError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(classify)?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

/// Decode a base64 `data:` URI. Percent-encoded (non-base64) URIs are rejected.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, OcrError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| OcrError::invalid_input("data URI must start with 'data:'"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| OcrError::invalid_input("data URI has no ',' separator"))?;

    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(OcrError::invalid_input(
            "only base64-encoded data URIs are supported",
        ));
    }

    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| OcrError::invalid_input(format!("data URI payload is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/scan.png"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn parse_classifies_strings() {
        assert_eq!(
            InputSource::parse("https://example.com/a.png"),
            InputSource::Url("https://example.com/a.png".into())
        );
        assert_eq!(
            InputSource::parse("data:image/png;base64,AAAA"),
            InputSource::DataUri("data:image/png;base64,AAAA".into())
        );
        assert_eq!(
            InputSource::parse("scans/page.png"),
            InputSource::Path(PathBuf::from("scans/page.png"))
        );
    }

    #[test]
    fn parse_trims_paths() {
        assert_eq!(
            InputSource::parse("  scans/page.png\n"),
            InputSource::Path(PathBuf::from("scans/page.png"))
        );
    }

    #[test]
    fn decode_base64_data_uri() {
        let bytes = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn decode_tolerates_wrapped_payload() {
        let bytes = decode_data_uri("data:text/plain;base64,aGVs\nbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        let err = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput { .. }));
    }

    #[test]
    fn corrupt_base64_is_rejected() {
        let err = decode_data_uri("data:image/png;base64,@@@").unwrap_err();
        assert!(err.to_string().contains("base64"), "got: {err}");
    }

    #[tokio::test]
    async fn resolves_local_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"\x89PNG fake").unwrap();
        let bytes = resolve_bytes(InputSource::from(tmp.path()), 5).await.unwrap();
        assert_eq!(bytes, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_bytes(InputSource::parse("/definitely/not/here.png"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn bytes_pass_through_untouched() {
        let bytes = resolve_bytes(InputSource::Bytes(vec![1, 2, 3]), 5).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
