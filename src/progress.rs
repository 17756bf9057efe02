//! Progress-callback trait for per-document screening events.
//!
//! Inject an [`Arc<dyn ScreeningProgressCallback>`] via
//! [`crate::screen::Screener::with_progress`] to receive events as each
//! document moves through the pipeline.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a log, or a terminal progress bar without the
//! library knowing how the host application communicates. The trait is
//! `Send + Sync` because documents are screened concurrently on
//! `tokio::spawn`ed tasks.
//!
//! # Example
//!
//! ```rust
//! use paper_screener::ScreeningProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ScreeningProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, file_name: &str, recommendation: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {file_name} -> {recommendation}");
//!     }
//! }
//! ```

use crate::output::ScreeningSummary;
use std::sync::Arc;

/// Called by the orchestrator as it screens each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With more than one worker, `on_file_start`, `on_file_complete` and
/// `on_file_error` may be called concurrently from different threads.
/// Implementations must protect shared mutable state with `Mutex` or atomics.
pub trait ScreeningProgressCallback: Send + Sync {
    /// Called once after discovery, before any document is submitted.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a worker picks up a document.
    fn on_file_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called when a document was analysed and parsed.
    ///
    /// `recommendation` is the tally label (`N/A` when the model left it
    /// blank).
    fn on_file_complete(&self, file_name: &str, recommendation: &str) {
        let _ = (file_name, recommendation);
    }

    /// Called when a document ended in `ERROR` or `FATAL_ERROR`.
    fn on_file_error(&self, file_name: &str, error: &str) {
        let _ = (file_name, error);
    }

    /// Called once after every result has been collected and the report
    /// written.
    fn on_run_complete(&self, summary: &ScreeningSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScreeningProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn ScreeningProgressCallback>;
