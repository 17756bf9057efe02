//! Screening orchestrator: discover → fan out → collect → sort → write.
//!
//! ## Why `tokio::spawn` inside `buffer_unordered`?
//!
//! `buffer_unordered(workers)` bounds how many documents are in flight, and
//! each document runs on its own spawned task. A panic inside one document's
//! pipeline then surfaces as a `JoinError` for that task alone; it is turned
//! into a `FATAL_ERROR` result so the report still accounts for every file.
//!
//! Results arrive in completion order; the orchestrator is their only
//! writer and sorts them by file name before anything is rendered.

use crate::config::{ReportFormat, ScreeningConfig};
use crate::error::{FileError, ScreenerError};
use crate::output::{AnalysisRecord, FileResult, ScreeningReport};
use crate::pipeline::extract::{extract_clean, PdfiumExtractor, TextExtractor};
use crate::pipeline::input::{discover_documents, display_name};
use crate::pipeline::llm::ApiClient;
use crate::pipeline::parse::parse_response;
use crate::progress::ProgressCallback;
use crate::prompts::PromptTemplate;
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs a screening pass over one input folder.
///
/// Every field is shared read-only with the worker tasks, so cloning a
/// `Screener` is cheap.
#[derive(Clone)]
pub struct Screener {
    config: Arc<ScreeningConfig>,
    client: Arc<ApiClient>,
    extractor: Arc<dyn TextExtractor>,
    template: Arc<PromptTemplate>,
    progress: Option<ProgressCallback>,
}

impl Screener {
    /// Validate `config` and build the production pipeline: pdfium text
    /// extraction, the configured LLM backend and the template from disk.
    ///
    /// # Errors
    /// Any [`ScreenerError`] here means the run must not start.
    pub fn from_config(config: ScreeningConfig) -> Result<Self, ScreenerError> {
        config.validate()?;
        let template = PromptTemplate::load(&config.prompt_template)?;
        let client = ApiClient::from_config(&config)?;
        Ok(Self::new(
            config,
            Arc::new(client),
            Arc::new(PdfiumExtractor::from_env()),
            template,
        ))
    }

    /// Assemble a screener from already-built parts.
    pub fn new(
        config: ScreeningConfig,
        client: Arc<ApiClient>,
        extractor: Arc<dyn TextExtractor>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            extractor,
            template: Arc::new(template),
            progress: None,
        }
    }

    /// Receive per-file events through `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    /// Screen every document in the input folder and write the report.
    ///
    /// Returns the sorted report. An input folder without candidate files
    /// yields an empty report and writes nothing.
    ///
    /// # Errors
    /// Only fatal errors: the folder cannot be listed or the report cannot
    /// be written. Per-file failures are inside the report.
    pub async fn run(&self) -> Result<ScreeningReport, ScreenerError> {
        let started = Instant::now();
        let docs = discover_documents(&self.config.input_dir, &self.config.extension)?;
        if docs.is_empty() {
            warn!(
                "No .{} files found in '{}'. Nothing to do.",
                self.config.extension,
                self.config.input_dir.display()
            );
            return Ok(ScreeningReport::default());
        }

        let total = docs.len();
        info!(
            "Starting processing of {} files with {} worker(s)...",
            total, self.config.workers
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_start(total);
        }

        let results = self.screen_all(docs).await;
        debug_assert_eq!(results.len(), total);

        let report = ScreeningReport::from_results(results);
        self.write_report(&report).await?;

        let summary = report.summary();
        info!(
            "Screening complete: {} processed, {} errors, {} total in {:.1}s",
            summary.processed,
            summary.errors,
            summary.total,
            started.elapsed().as_secs_f64()
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_complete(&summary);
        }
        Ok(report)
    }

    /// Fan the documents out over at most `workers` concurrent tasks and
    /// collect one result per document, in completion order.
    async fn screen_all(&self, docs: Vec<PathBuf>) -> Vec<FileResult> {
        let workers = self.config.workers.max(1);
        stream::iter(docs.into_iter().map(|path| {
            let screener = self.clone();
            async move {
                let file_name = display_name(&path);
                if let Some(ref cb) = screener.progress {
                    cb.on_file_start(&file_name);
                }

                let task = {
                    let screener = screener.clone();
                    let path = path.clone();
                    tokio::spawn(async move { screener.process_file(&path).await })
                };
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Fatal error processing {}: {}", file_name, e);
                        FileResult::fatal(file_name, path, format!("Task execution failed: {e}"))
                    }
                };

                if let Some(ref cb) = screener.progress {
                    match result.analysis {
                        Some(ref a) => cb.on_file_complete(&result.file_name, a.recommendation_label()),
                        None => cb.on_file_error(
                            &result.file_name,
                            result.details.as_deref().unwrap_or("unknown error"),
                        ),
                    }
                }
                result
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await
    }

    /// Run the single-document pipeline: extract → prompt → complete → parse.
    ///
    /// Never fails; every failure is captured in the returned [`FileResult`].
    pub async fn process_file(&self, path: &Path) -> FileResult {
        let started = Instant::now();
        let timestamp = Local::now();
        let file_name = display_name(path);
        info!("Processing: {}", file_name);

        match self.analyse(path).await {
            Ok(analysis) => {
                let elapsed = started.elapsed().as_secs_f64();
                info!(
                    "Successfully processed: {} in {:.2}s",
                    file_name, elapsed
                );
                FileResult::processed(file_name, path.to_path_buf(), timestamp, analysis, elapsed)
            }
            Err(e) => {
                warn!("{}: {}", file_name, e);
                FileResult::error(
                    file_name,
                    path.to_path_buf(),
                    timestamp,
                    e.to_string(),
                    started.elapsed().as_secs_f64(),
                )
            }
        }
    }

    async fn analyse(&self, path: &Path) -> Result<AnalysisRecord, FileError> {
        let text = extract_clean(self.extractor.as_ref(), path, self.config.max_pages)
            .await
            .map_err(|e| FileError::ExtractionFailed {
                chars: 0,
                detail: Some(e.to_string()),
            })?;

        let chars = text.trim().chars().count();
        if chars == 0 || chars < self.config.min_text_chars {
            debug!("{}: only {} usable characters", path.display(), chars);
            return Err(FileError::ExtractionFailed {
                chars,
                detail: None,
            });
        }

        let prompt = self.template.render(&text);
        let raw = self
            .client
            .get_completion(&prompt)
            .await
            .map_err(|e| FileError::ApiFailed {
                detail: e.to_string(),
            })?;

        parse_response(&raw).map_err(|e| FileError::ParseFailed {
            detail: e.to_string(),
        })
    }

    /// Render `report` in the configured format and replace the output file
    /// atomically (temp file in the same folder, then rename).
    async fn write_report(&self, report: &ScreeningReport) -> Result<(), ScreenerError> {
        let path = self.config.output_file.clone();
        let body = match self.config.report_format {
            ReportFormat::Text => report.to_text(),
            ReportFormat::Json => report
                .to_json()
                .map_err(|e| ScreenerError::Internal(format!("report serialisation: {e}")))?,
        };

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, body.as_bytes()))
            .await
            .map_err(|e| ScreenerError::Internal(format!("report writer task failed: {e}")))?
            .map_err(|e| ScreenerError::ReportWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        info!("Results written to {}", path.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Synchronous wrapper around [`Screener::run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(screener: &Screener) -> Result<ScreeningReport, ScreenerError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScreenerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(screener.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/report.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "temp file left behind");
    }
}
