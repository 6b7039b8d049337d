//! Image encoding: raw bytes → base64 data URI for the request body.
//!
//! Chat-completions vision APIs accept images as `data:<mime>;base64,…` URLs.
//! The bytes are forwarded untouched; only the MIME label is derived, by
//! sniffing the magic bytes.

use crate::config::SUPPORTED_IMAGE_TYPES;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// MIME type used when the bytes match no supported format.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// Guess the MIME type of an image buffer.
///
/// Returns one of [`SUPPORTED_IMAGE_TYPES`]; unrecognised or unsupported
/// formats fall back to [`FALLBACK_MIME`] and are left for the endpoint to
/// accept or reject.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => FALLBACK_MIME,
    };
    debug_assert!(SUPPORTED_IMAGE_TYPES.contains(&mime));
    mime
}

/// Encode an image buffer as a base64 data URI.
pub fn to_data_uri(bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes);
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image bytes → {} bytes base64 ({mime})", bytes.len(), b64.len());
    format!("data:{mime};base64,{b64}")
}
