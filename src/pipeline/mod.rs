//! Pipeline stages for screening one document.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets us swap implementations (e.g. a
//! different text extractor or LLM backend) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ parse
//! (folder)   (pdfium)   (API)   (key: value)
//! ```
//!
//! 1. [`input`]   — list candidate documents in the input folder
//! 2. [`extract`] — text of the first pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe, then cleaned and truncated
//! 3. [`llm`]     — one completion per document with pacing and
//!    retry/backoff; the only stage with network I/O
//! 4. [`parse`]   — the model's `key: value` lines into a typed record

pub mod extract;
pub mod input;
pub mod llm;
pub mod parse;
