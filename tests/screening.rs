//! Integration tests for the screening orchestrator.
//!
//! The whole run (discovery, fan-out, pipeline, report write) is exercised
//! with an in-memory text extractor and a scripted completion backend, so
//! no pdfium library and no network are needed.
//!
//! Run with:
//!   cargo test --test screening

use async_trait::async_trait;
use paper_screener::pipeline::extract::ExtractError;
use paper_screener::{
    ApiClient, ApiError, CompletionBackend, CompletionRequest, FileStatus, PromptTemplate,
    ReportFormat, run_sync, Screener, ScreenerError, ScreeningConfig, ScreeningProgressCallback, ScreeningSummary,
    TextExtractor,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// What the fake extractor does for a given file name.
#[derive(Clone)]
enum Doc {
    Text(String),
    Unreadable,
    Panic,
}

struct FakeExtractor {
    docs: HashMap<String, Doc>,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, path: &Path, _max_pages: usize) -> Result<String, ExtractError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        match self.docs.get(&name).cloned() {
            Some(Doc::Text(t)) => Ok(t),
            Some(Doc::Unreadable) | None => Err(ExtractError::Open {
                path: path.to_path_buf(),
                detail: "not a PDF".into(),
            }),
            Some(Doc::Panic) => panic!("pdf engine crashed on {name}"),
        }
    }
}

/// Answers according to the `TOPIC-<label>` marker found in the prompt.
#[derive(Default)]
struct ScriptedBackend {
    calls: AtomicUsize,
    always_fail: bool,
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(ApiError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        if request.prompt.contains("TOPIC-PROSE") {
            return Ok("I am unable to assess this paper.".into());
        }
        let label = ["KEEP", "REVIEW", "EXCLUDE"]
            .into_iter()
            .find(|l| request.prompt.contains(&format!("TOPIC-{l}")))
            .unwrap_or("MAYBE");
        Ok(format!(
            "is_relevant: {}\n\
             confidence_score: 0.8\n\
             primary_focus: Concrete durability\n\
             recommendation: {label}\n\
             materials_identified: concrete, steel\n\
             key_evidence: chloride ingress\n\
             exclusion_reasons: ",
            label == "KEEP"
        ))
    }
}

/// Long enough to pass the minimum-content check.
fn paper(marker: &str) -> Doc {
    Doc::Text(format!("TOPIC-{marker}\n\n{}", "lorem ipsum dolor ".repeat(20)))
}

struct Fixture {
    dir: tempfile::TempDir,
    docs: HashMap<String, Doc>,
}

impl Fixture {
    fn new(files: &[(&str, Doc)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("papers")).unwrap();
        let mut docs = HashMap::new();
        for (name, doc) in files {
            std::fs::write(dir.path().join("papers").join(name), b"%PDF-1.4").unwrap();
            docs.insert(name.to_string(), doc.clone());
        }
        Self { dir, docs }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out/screening_results.txt")
    }

    fn config(&self, workers: usize) -> ScreeningConfig {
        ScreeningConfig::builder()
            .input_dir(self.dir.path().join("papers"))
            .output_file(self.output())
            .workers(workers)
            .max_attempts(2)
            .retry_backoff_ms(0, 0)
            .request_delay_ms(0)
            .build()
            .unwrap()
    }

    fn screener(&self, config: ScreeningConfig, backend: Arc<ScriptedBackend>) -> Screener {
        let client = ApiClient::new(backend, &config);
        Screener::new(
            config,
            Arc::new(client),
            Arc::new(FakeExtractor {
                docs: self.docs.clone(),
            }),
            PromptTemplate::new("Screen this paper:\n{paper_text}").unwrap(),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_papers_two_workers_sorted_report() {
    let fx = Fixture::new(&[
        ("c.pdf", paper("EXCLUDE")),
        ("a.pdf", paper("KEEP")),
        ("b.pdf", paper("REVIEW")),
    ]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(2), backend.clone()).run().await.unwrap();

    let names: Vec<&str> = report.results().iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

    let summary = report.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed + summary.errors, 3);
    assert_eq!(summary.count("KEEP"), 1);
    assert_eq!(summary.count("REVIEW"), 1);
    assert_eq!(summary.count("EXCLUDE"), 1);

    let text = std::fs::read_to_string(fx.output()).unwrap();
    assert_eq!(text.matches("--- Result for: ").count(), 3);
    let a = text.find("--- Result for: a.pdf").unwrap();
    let b = text.find("--- Result for: b.pdf").unwrap();
    let c = text.find("--- Result for: c.pdf").unwrap();
    assert!(a < b && b < c);
    assert!(text.contains("Recommendation: KEEP\nIs Relevant: true\nConfidence: 0.8\n"));
    assert!(text.contains("Materials Identified: concrete, steel\n"));
}

#[tokio::test]
async fn short_text_is_error_and_api_is_not_called() {
    let fx = Fixture::new(&[("short.pdf", Doc::Text("x".repeat(150)))]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(1), backend.clone()).run().await.unwrap();

    let r = &report.results()[0];
    assert_eq!(r.status, FileStatus::Error);
    assert!(r.analysis.is_none());
    assert!(r.details.as_deref().unwrap().contains("too short"));
    assert!(r.processing_time_secs.is_some());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreadable_pdf_is_extraction_error() {
    let fx = Fixture::new(&[("broken.pdf", Doc::Unreadable), ("ok.pdf", paper("KEEP"))]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(1), backend.clone()).run().await.unwrap();

    assert_eq!(report.results()[0].file_name, "broken.pdf");
    assert_eq!(report.results()[0].status, FileStatus::Error);
    assert_eq!(report.results()[1].status, FileStatus::Processed);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn crashed_task_becomes_fatal_error_and_run_continues() {
    let fx = Fixture::new(&[
        ("a.pdf", paper("KEEP")),
        ("boom.pdf", Doc::Panic),
        ("c.pdf", paper("REVIEW")),
    ]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(2), backend).run().await.unwrap();

    assert_eq!(report.len(), 3);
    let boom = report
        .results()
        .iter()
        .find(|r| r.file_name == "boom.pdf")
        .unwrap();
    assert_eq!(boom.status, FileStatus::FatalError);
    assert!(boom
        .details
        .as_deref()
        .unwrap()
        .starts_with("Task execution failed"));
    assert!(boom.processing_time_secs.is_none());

    let summary = report.summary();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);

    let text = std::fs::read_to_string(fx.output()).unwrap();
    assert!(text.contains("Status: FATAL_ERROR\n"));
    assert!(text.contains("Processing Time: N/A\n"));
}

#[tokio::test]
async fn exhausted_retries_are_reported_per_file() {
    let fx = Fixture::new(&[("a.pdf", paper("KEEP"))]);
    let backend = Arc::new(ScriptedBackend {
        always_fail: true,
        ..Default::default()
    });
    let report = fx.screener(fx.config(1), backend.clone()).run().await.unwrap();

    let r = &report.results()[0];
    assert_eq!(r.status, FileStatus::Error);
    let details = r.details.as_deref().unwrap();
    assert!(details.contains("after 2 attempts"), "got: {details}");
    assert!(details.contains("rate limited"), "got: {details}");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prose_completion_is_processed_with_defaults() {
    let fx = Fixture::new(&[("a.pdf", paper("PROSE"))]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(1), backend).run().await.unwrap();

    let r = &report.results()[0];
    assert_eq!(r.status, FileStatus::Processed);
    let analysis = r.analysis.as_ref().unwrap();
    assert_eq!(analysis.missing_fields.len(), 7);
    assert!(!analysis.is_relevant);

    let summary = report.summary();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.count("N/A"), 1);

    let text = std::fs::read_to_string(fx.output()).unwrap();
    assert!(text.contains("Status: PROCESSED"));
    assert!(text.contains("Recommendation: N/A"));
}

#[tokio::test]
async fn unexpected_label_is_tallied_verbatim() {
    let fx = Fixture::new(&[("a.pdf", paper("OTHER")), ("b.pdf", paper("KEEP"))]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(1), backend).run().await.unwrap();

    let summary = report.summary();
    assert_eq!(summary.count("MAYBE"), 1);
    assert_eq!(summary.count("KEEP"), 1);
    assert_eq!(summary.count("REVIEW"), 0);
}

#[tokio::test]
async fn empty_folder_writes_no_report() {
    let fx = Fixture::new(&[]);
    std::fs::write(fx.dir.path().join("papers/readme.txt"), "not a paper").unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let report = fx.screener(fx.config(1), backend).run().await.unwrap();

    assert!(report.is_empty());
    assert!(!fx.output().exists());
}

#[tokio::test]
async fn json_report_format() {
    let fx = Fixture::new(&[("b.pdf", paper("REVIEW")), ("a.pdf", Doc::Text("tiny".into()))]);
    let backend = Arc::new(ScriptedBackend::default());
    let config = ScreeningConfig::builder()
        .input_dir(fx.dir.path().join("papers"))
        .output_file(fx.output())
        .retry_backoff_ms(0, 0)
        .request_delay_ms(0)
        .report_format(ReportFormat::Json)
        .build()
        .unwrap();
    fx.screener(config, backend).run().await.unwrap();

    let raw = std::fs::read_to_string(fx.output()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let items = value.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["file_name"], "a.pdf");
    assert_eq!(items[0]["status"], "ERROR");
    assert_eq!(items[1]["status"], "PROCESSED");
    assert_eq!(items[1]["analysis"]["recommendation"], "REVIEW");
    assert_eq!(items[1]["analysis"]["key_evidence"][0], "chloride ingress");
}

#[derive(Default)]
struct RecordingCallback {
    total: AtomicUsize,
    started: AtomicUsize,
    events: Mutex<Vec<String>>,
    summary: Mutex<Option<ScreeningSummary>>,
}

impl ScreeningProgressCallback for RecordingCallback {
    fn on_run_start(&self, total_files: usize) {
        self.total.store(total_files, Ordering::SeqCst);
    }

    fn on_file_start(&self, _file_name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_complete(&self, file_name: &str, recommendation: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {file_name} {recommendation}"));
    }

    fn on_file_error(&self, file_name: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("err {file_name}"));
    }

    fn on_run_complete(&self, summary: &ScreeningSummary) {
        *self.summary.lock().unwrap() = Some(summary.clone());
    }
}

#[tokio::test]
async fn progress_events_cover_every_file() {
    let fx = Fixture::new(&[
        ("a.pdf", paper("KEEP")),
        ("b.pdf", Doc::Text("short".into())),
        ("c.pdf", paper("EXCLUDE")),
    ]);
    let backend = Arc::new(ScriptedBackend::default());
    let cb = Arc::new(RecordingCallback::default());
    fx.screener(fx.config(3), backend)
        .with_progress(cb.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(cb.total.load(Ordering::SeqCst), 3);
    assert_eq!(cb.started.load(Ordering::SeqCst), 3);

    let mut events = cb.events.lock().unwrap().clone();
    events.sort();
    assert_eq!(events, vec!["err b.pdf", "ok a.pdf KEEP", "ok c.pdf EXCLUDE"]);

    let summary = cb.summary.lock().unwrap().clone().unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 2);
}

#[test]
fn run_sync_drives_its_own_runtime() {
    let fx = Fixture::new(&[("a.pdf", paper("KEEP"))]);
    let backend = Arc::new(ScriptedBackend::default());
    let report = run_sync(&fx.screener(fx.config(1), backend)).unwrap();
    assert_eq!(report.summary().count("KEEP"), 1);
    assert!(fx.output().exists());
}

#[test]
fn callback_and_screener_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Screener>();
    assert_send_sync::<RecordingCallback>();
}

#[test]
fn from_config_missing_template_aborts_without_report() {
    let fx = Fixture::new(&[("a.pdf", paper("KEEP"))]);
    let config = ScreeningConfig::builder()
        .api_key("sk-test")
        .input_dir(fx.dir.path().join("papers"))
        .output_file(fx.output())
        .prompt_template(fx.dir.path().join("missing_prompt.txt"))
        .build()
        .unwrap();

    match Screener::from_config(config) {
        Err(ScreenerError::InvalidConfig { problems }) => {
            assert!(
                problems.iter().any(|p| p.contains("Prompt template")),
                "got: {problems:?}"
            );
        }
        Err(other) => panic!("expected InvalidConfig, got {other:?}"),
        Ok(_) => panic!("screener built without a prompt template"),
    }
    assert!(!fx.output().exists());
}
