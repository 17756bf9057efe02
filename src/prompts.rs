//! Prompt text for the screening call.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the system instruction and the fallback
//!    template are edited in exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts and render templates
//!    without a model behind them.
//!
//! The per-topic instructions live in a user-supplied template file loaded
//! through [`PromptTemplate::load`]; [`DEFAULT_PROMPT_TEMPLATE`] is what
//! `paper-screener --print-default-template` emits as a starting point.

use crate::error::ScreenerError;
use std::path::Path;
use tracing::debug;

/// Fixed, non-conversational system message sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You are a highly specialized academic paper analysis assistant. Follow user instructions precisely and only return text in the specified format.";

/// Marker replaced by the extracted document text.
pub const PLACEHOLDER: &str = "{paper_text}";

/// Starting-point template asking for the key-value format the parser reads.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are screening academic papers for a literature review.

Read the paper text below and decide whether the paper is relevant to the
review topic. Base your judgement only on the text provided.

Answer with exactly these lines and nothing else:

is_relevant: <true or false>
confidence_score: <number between 0.0 and 1.0>
primary_focus: <one sentence describing the paper's main subject>
recommendation: <KEEP, REVIEW or EXCLUDE>
materials_identified: <comma-separated list, or leave empty>
key_evidence: <comma-separated list of short phrases from the text>
exclusion_reasons: <comma-separated list, or leave empty>

Paper text:
"""
{paper_text}
"""
"#;

/// A validated prompt template, loaded once per run and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Wrap `text`, rejecting templates without [`PLACEHOLDER`].
    pub fn new(text: impl Into<String>) -> Result<Self, ScreenerError> {
        Self::checked(text.into(), Path::new("<inline>"))
    }

    /// Read and validate the template file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScreenerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScreenerError::TemplateRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Loaded prompt template from '{}'", path.display());
        Self::checked(text, path)
    }

    fn checked(text: String, origin: &Path) -> Result<Self, ScreenerError> {
        if !text.contains(PLACEHOLDER) {
            return Err(ScreenerError::TemplatePlaceholderMissing {
                path: origin.to_path_buf(),
                placeholder: PLACEHOLDER.to_string(),
            });
        }
        Ok(Self { text })
    }

    /// Substitute `paper_text` for the placeholder.
    ///
    /// Plain text replacement: braces elsewhere in the template (JSON
    /// snippets, set notation) are left untouched.
    pub fn render(&self, paper_text: &str) -> String {
        self.text.replace(PLACEHOLDER, paper_text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}
