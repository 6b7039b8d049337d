//! Instruction text sent alongside every image.
//!
//! Callers can override it via [`crate::config::ExtractorConfig::prompt`];
//! the constant here is used only when no override is provided.

/// Default extraction instruction.
pub const EXTRACTION_PROMPT: &str = "Extract all visible text from this image. \
Format the output as markdown. \
Include only the text content, no explanations or additional context. \
Fix any formatting issues, typos, or inconsistencies found in the extracted content.";
