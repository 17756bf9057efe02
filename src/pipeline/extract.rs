//! Text extraction: PDF → cleaned, length-bounded plain text.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. `tokio::task::spawn_blocking` moves the work
//! onto the blocking thread pool so the Tokio workers driving HTTP calls for
//! other documents never stall on a large PDF.
//!
//! ## Why truncate?
//!
//! The model only needs the title, abstract and opening sections to judge
//! relevance. Capping the text at [`MAX_TEXT_CHARS`] keeps every prompt well
//! inside typical context windows and keeps per-document cost predictable.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Hard cap on extracted characters sent to the model.
pub const MAX_TEXT_CHARS: usize = 8000;

/// Appended after the cut when the text was truncated.
pub const TRUNCATION_MARKER: &str = "\n[...Text Truncated...]";

/// Why a document produced no text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The pdfium shared library could not be loaded.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.")]
    Binding(String),

    /// pdfium could not open the document.
    #[error("Error reading PDF file '{path}': {detail}")]
    Open { path: PathBuf, detail: String },

    /// The blocking extraction task panicked.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Source of plain text for a document.
///
/// Implementations return the raw joined text of the first `max_pages`
/// pages; cleaning and truncation are applied by [`extract_clean`] so every
/// backend produces the same shape of output.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw text from at most `max_pages` leading pages of `path`.
    async fn extract(&self, path: &Path, max_pages: usize) -> Result<String, ExtractError>;
}

/// Run `extractor` and normalise its output with [`clean_text`] and
/// [`truncate_text`].
pub async fn extract_clean(
    extractor: &dyn TextExtractor,
    path: &Path,
    max_pages: usize,
) -> Result<String, ExtractError> {
    let raw = extractor.extract(path, max_pages).await?;
    let text = truncate_text(&clean_text(&raw));
    debug!(
        "Extracted and cleaned {} characters from '{}'",
        text.len(),
        path.display()
    );
    Ok(text)
}

// ── pdfium backend ───────────────────────────────────────────────────────────

/// [`TextExtractor`] backed by pdfium's text layer.
///
/// The library is located through `PDFIUM_LIB_PATH` (a file or the directory
/// holding it), falling back to the system library search path. Binding
/// happens per document inside the blocking task, so a missing library turns
/// into a per-file error rather than a crash.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    /// Use `PDFIUM_LIB_PATH` if set, else the system library.
    pub fn from_env() -> Self {
        Self {
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to the pdfium library at `path` (a file or a directory).
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, path: &Path, max_pages: usize) -> Result<String, ExtractError> {
        let path = path.to_path_buf();
        let library = self.library_path.clone();

        tokio::task::spawn_blocking(move || extract_blocking(library.as_deref(), &path, max_pages))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let bindings = match library {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::Binding(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_blocking(
    library: Option<&Path>,
    pdf_path: &Path,
    max_pages: usize,
) -> Result<String, ExtractError> {
    let pdfium = bind_pdfium(library)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ExtractError::Open {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let mut parts = Vec::new();
    for (idx, page) in document.pages().iter().take(max_pages).enumerate() {
        match page.text() {
            Ok(text) => {
                let content = text.all();
                if !content.trim().is_empty() {
                    parts.push(content);
                }
            }
            Err(e) => warn!(
                "Skipping page {} of '{}': {:?}",
                idx + 1,
                pdf_path.display(),
                e
            ),
        }
    }

    Ok(parts.join("\n"))
}

// ── Cleaning ─────────────────────────────────────────────────────────────────

static RE_NON_PRINTABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x20-\x7E\n\t]").unwrap());
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

/// Sanitise raw PDF text.
///
/// 1. Drop everything except printable ASCII, newline and tab (ligatures,
///    control bytes and stray glyphs from the text layer)
/// 2. Collapse any run of blank or whitespace-only lines to one blank line
/// 3. Collapse runs of spaces to a single space
/// 4. Trim the ends
pub fn clean_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let s = RE_NON_PRINTABLE.replace_all(input, "");
    let s = RE_BLANK_RUN.replace_all(&s, "\n\n");
    let s = RE_SPACE_RUN.replace_all(&s, " ");
    s.trim().to_string()
}

/// Cut `text` to [`MAX_TEXT_CHARS`] characters and append
/// [`TRUNCATION_MARKER`] when anything was dropped.
pub fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText(&'static str);

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract(&self, _path: &Path, _max_pages: usize) -> Result<String, ExtractError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_clean_strips_non_printable() {
        assert_eq!(clean_text("ﬁne\u{0}text\u{7}"), "netext");
        assert_eq!(clean_text("café"), "caf");
    }

    #[test]
    fn test_clean_keeps_tabs() {
        assert_eq!(clean_text("a\tb"), "a\tb");
    }

    #[test]
    fn test_clean_collapses_blank_lines() {
        assert_eq!(clean_text("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_text("a\n   \n \t\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_collapses_spaces() {
        assert_eq!(clean_text("a     b  c"), "a b c");
    }

    #[test]
    fn test_clean_trims() {
        assert_eq!(clean_text("  \n hello \n  "), "hello");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_clean_drops_carriage_returns() {
        assert_eq!(clean_text("a\r\nb"), "a\nb");
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        let text = "x".repeat(MAX_TEXT_CHARS);
        assert_eq!(truncate_text(&text), text);
    }

    #[test]
    fn test_truncate_long_text_adds_marker() {
        let text = "y".repeat(MAX_TEXT_CHARS + 5);
        let out = truncate_text(&text);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.len(), MAX_TEXT_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn extract_clean_normalises_backend_output() {
        let extractor = FixedText("  Title\n\n\n\nAbstract   text  ");
        let text = tokio_test::block_on(extract_clean(&extractor, Path::new("x.pdf"), 10)).unwrap();
        assert_eq!(text, "Title\n\nAbstract text");
    }

    #[tokio::test]
    async fn missing_library_is_an_error_not_a_panic() {
        let extractor = PdfiumExtractor::with_library_path("/definitely/not/libpdfium.so");
        let result = extractor.extract(Path::new("/nope.pdf"), 10).await;
        assert!(matches!(result, Err(ExtractError::Binding(_))));
    }
}
