//! Post-processing of the model's reply.
//!
//! The instruction asks for bare Markdown, but models still wrap the whole
//! answer in a fenced block now and then. Only a fence that encloses the
//! entire reply is removed; fences inside the text are content and stay.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid regex")
});

/// Strip a code fence that wraps the entire reply, plus surrounding whitespace.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) if !caps[1].contains("\n```") => caps[1].trim().to_string(),
        _ => trimmed.to_string(),
    }
}
