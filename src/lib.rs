//! # paper-screener
//!
//! Batch-screen academic PDFs for relevance to a research topic with Large
//! Language Models.
//!
//! ## Why this crate?
//!
//! A literature review starts with hundreds of candidate papers, most of
//! which are off-topic. Reading the first pages of each is tedious but
//! mechanical. This crate extracts the opening text of every PDF in a
//! folder, asks an LLM to judge it against a prompt you write, and collects
//! the answers into one report with a KEEP / REVIEW / EXCLUDE label per
//! paper.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder of PDFs
//!  │
//!  ├─ 1. Input    list *.pdf (non-recursive, sorted)
//!  ├─ 2. Extract  text of the first N pages via pdfium (spawn_blocking)
//!  ├─ 3. Prompt   substitute the text into the {paper_text} template
//!  ├─ 4. LLM      one completion per paper, paced, bounded retries
//!  ├─ 5. Parse    key: value lines → AnalysisRecord
//!  └─ 6. Report   sorted per-file blocks + recommendation tally
//! ```
//!
//! Failures are per file: a paper with no usable text, an exhausted retry
//! budget or an unparseable answer shows up as `ERROR` in the report while
//! every other paper is screened normally.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_screener::{Screener, ScreeningConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from DASHSCOPE_API_KEY unless set in the config file.
//!     let config = ScreeningConfig::from_file("config.json")?;
//!     let report = Screener::from_config(config)?.run().await?;
//!     let summary = report.summary();
//!     eprintln!("{} kept of {}", summary.count("KEEP"), summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-screener` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! paper-screener = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod screen;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigFile, ReportFormat, ScreeningConfig, ScreeningConfigBuilder};
pub use error::{ApiError, FileError, ScreenerError};
pub use output::{AnalysisRecord, FileResult, FileStatus, ScreeningReport, ScreeningSummary};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::llm::{ApiClient, CompletionBackend, CompletionRequest, RetryPolicy};
pub use pipeline::parse::parse_response;
pub use progress::{NoopProgressCallback, ProgressCallback, ScreeningProgressCallback};
pub use prompts::PromptTemplate;
pub use screen::{run_sync, Screener};
