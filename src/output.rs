//! Result types returned by the extraction pipelines.
//!
//! Both types are plain serialisable records: callers can return them from a
//! web handler as-is. Failure is never encoded by omission; a failed item has
//! empty `content` and a populated `metadata.error`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Per-item metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Size in bytes of the image that was sent, when one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    /// Completion time, RFC 3339 UTC with milliseconds.
    pub timestamp: String,

    /// Why the item failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Text extracted from one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResult {
    pub content: String,
    pub metadata: ResultMetadata,
}

impl ImageResult {
    pub(crate) fn success(content: String, size: usize) -> Self {
        Self {
            content,
            metadata: ResultMetadata {
                size: Some(size),
                timestamp: now_timestamp(),
                error: None,
            },
        }
    }

    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            metadata: ResultMetadata {
                size: None,
                timestamp: now_timestamp(),
                error: Some(error.into()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.metadata.error.is_none()
    }
}

/// Text extracted from one page of a document (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub page: usize,
    pub content: String,
    pub metadata: ResultMetadata,
}

impl PageResult {
    /// Tag an image result with its page number.
    pub fn from_image(page: usize, result: ImageResult) -> Self {
        Self {
            page,
            content: result.content,
            metadata: result.metadata,
        }
    }

    pub(crate) fn failure(page: usize, error: impl Into<String>) -> Self {
        Self::from_image(page, ImageResult::failure(error))
    }

    pub fn is_success(&self) -> bool {
        self.metadata.error.is_none()
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn timestamp_is_sortable_rfc3339() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'), "got: {ts}");
        assert_eq!(ts.len(), "2026-01-01T00:00:00.000Z".len());
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn failure_has_empty_content_and_error() {
        let r = ImageResult::failure("nope");
        assert!(r.content.is_empty());
        assert_eq!(r.metadata.error.as_deref(), Some("nope"));
        assert_eq!(r.metadata.size, None);
        assert!(!r.is_success());
    }

    #[test]
    fn page_result_serialises_flat_and_omits_absent_fields() {
        let page = PageResult::from_image(2, ImageResult::success("hello".into(), 42));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["content"], "hello");
        assert_eq!(json["metadata"]["size"], 42);
        assert!(json["metadata"].get("error").is_none());
        assert!(json["metadata"]["timestamp"].is_string());
    }
}
