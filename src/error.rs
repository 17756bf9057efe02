//! Error types for the paper-screener library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`ScreenerError`] — **Fatal**: the run cannot start at all (missing
//!   config file, no API key, empty input folder, unreadable prompt
//!   template). Returned as `Err(ScreenerError)` from the top-level
//!   [`crate::screen::Screener`] entry points, before any file is touched.
//!
//! * [`FileError`] — **Non-fatal**: a single document failed (no usable
//!   text, API retries exhausted, unparseable answer) but every other
//!   document is fine. Rendered into [`crate::output::FileResult::details`]
//!   so the report accounts for every file.
//!
//! * [`ApiError`] — transport or provider failure of one completion call.
//!   The retry loop in [`crate::pipeline::llm`] consumes these; only the
//!   final [`ApiError::RetriesExhausted`] ever reaches a [`FileError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper-screener library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::FileResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScreenerError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The JSON config file does not exist.
    #[error("Configuration file not found: '{path}'\nCreate one with: paper-screener --print-default-config > {path:?}")]
    ConfigNotFound { path: PathBuf },

    /// The config file exists but could not be read or is not valid JSON.
    #[error("Failed to parse configuration file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// Validation found one or more problems. All of them are listed.
    #[error("Invalid configuration:\n  - {}", .problems.join("\n  - "))]
    InvalidConfig { problems: Vec<String> },

    // ── Startup errors ────────────────────────────────────────────────────
    /// The input folder could not be listed.
    #[error("Failed to read input folder '{path}': {source}")]
    InputDirRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prompt template could not be read.
    #[error("Failed to read prompt template '{path}': {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prompt template has no `{placeholder}` to receive the paper text.
    #[error("Prompt template '{path}' does not contain the {placeholder} placeholder")]
    TemplatePlaceholderMissing { path: PathBuf, placeholder: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the report file.
    #[error("Failed to write report file '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// The `Display` text is what ends up on the `Details:` line of the report.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// Extraction failed or produced fewer usable characters than required.
    #[error("Text extraction failed or content is too short.")]
    ExtractionFailed { chars: usize, detail: Option<String> },

    /// The completion call failed after every retry.
    #[error("{detail}")]
    ApiFailed { detail: String },

    /// The completion could not be parsed into an analysis record.
    #[error("{detail}")]
    ParseFailed { detail: String },
}

/// Failure of a single completion call, or of the whole retry loop.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, TLS, timeout…).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response carried no completion text.
    #[error("API response contained no completion text")]
    EmptyResponse,

    /// A named provider backend reported an error.
    #[error("Provider '{provider}' error: {detail}")]
    Provider { provider: String, detail: String },

    /// Every attempt failed; `last_error` is the final attempt's message.
    #[error("API call failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_problem() {
        let e = ScreenerError::InvalidConfig {
            problems: vec!["API key is not set.".into(), "No PDF files found.".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("API key is not set."), "got: {msg}");
        assert!(msg.contains("No PDF files found."), "got: {msg}");
    }

    #[test]
    fn extraction_failed_display_mentions_content() {
        let e = FileError::ExtractionFailed {
            chars: 150,
            detail: None,
        };
        assert!(e.to_string().contains("too short"));
    }

    #[test]
    fn retries_exhausted_display() {
        let e = ApiError::RetriesExhausted {
            attempts: 3,
            last_error: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("HTTP 503"), "got: {msg}");
    }

    #[test]
    fn placeholder_missing_display() {
        let e = ScreenerError::TemplatePlaceholderMissing {
            path: PathBuf::from("prompt.txt"),
            placeholder: "{paper_text}".into(),
        };
        assert!(e.to_string().contains("{paper_text}"));
    }
}
