//! Result types: per-document outcomes, the aggregated report and its
//! summary.
//!
//! A [`FileResult`] is produced exactly once per discovered document, by the
//! pipeline or (for a crashed task) by the orchestrator, and is never
//! modified after it reaches the orchestrator. [`ScreeningReport`] owns the
//! sorted collection and knows how to render it.

use crate::pipeline::parse::FieldValue;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Recommendation labels the prompt asks for, in summary order.
pub const KNOWN_RECOMMENDATIONS: [&str; 4] = ["KEEP", "REVIEW", "EXCLUDE", "N/A"];

/// Structured answer parsed from one completion.
///
/// Every expected field is always populated; fields the model did not
/// provide hold their type's default and are named in `missing_fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub is_relevant: bool,
    pub confidence_score: f64,
    pub primary_focus: String,
    /// Usually KEEP / REVIEW / EXCLUDE, but kept verbatim.
    pub recommendation: String,
    pub materials_identified: Vec<String>,
    pub key_evidence: Vec<String>,
    pub exclusion_reasons: Vec<String>,
    /// Keys outside the expected set, trimmed text as written.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    /// Expected keys absent from the completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl AnalysisRecord {
    /// Store a coerced value under the expected `field`. Unknown field names
    /// and values whose variant does not match the field's type are ignored.
    pub fn apply(&mut self, field: &str, value: FieldValue) {
        match (field, value) {
            ("is_relevant", FieldValue::Bool(v)) => self.is_relevant = v,
            ("confidence_score", FieldValue::Float(v)) => self.confidence_score = v,
            ("primary_focus", FieldValue::Text(v)) => self.primary_focus = v,
            ("recommendation", FieldValue::Text(v)) => self.recommendation = v,
            ("materials_identified", FieldValue::List(v)) => self.materials_identified = v,
            ("key_evidence", FieldValue::List(v)) => self.key_evidence = v,
            ("exclusion_reasons", FieldValue::List(v)) => self.exclusion_reasons = v,
            _ => {}
        }
    }

    /// Label used for tallies: the recommendation, or `N/A` when blank.
    pub fn recommendation_label(&self) -> &str {
        let label = self.recommendation.trim();
        if label.is_empty() {
            "N/A"
        } else {
            label
        }
    }
}

/// Outcome category of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Analysed and parsed.
    Processed,
    /// A pipeline stage failed; see `details`.
    Error,
    /// The worker task itself died; see `details`.
    FatalError,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStatus::Processed => "PROCESSED",
            FileStatus::Error => "ERROR",
            FileStatus::FatalError => "FATAL_ERROR",
        })
    }
}

/// Outcome for a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file_name: String,
    pub file_path: PathBuf,
    /// When processing of this file started.
    pub timestamp: DateTime<Local>,
    pub status: FileStatus,
    /// Present only when `status` is [`FileStatus::Processed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisRecord>,
    /// Present only when `status` is not [`FileStatus::Processed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Wall-clock seconds, rounded to two decimals. `None` for crashed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_secs: Option<f64>,
}

impl FileResult {
    /// Successful result.
    pub fn processed(
        file_name: String,
        file_path: PathBuf,
        timestamp: DateTime<Local>,
        analysis: AnalysisRecord,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            file_name,
            file_path,
            timestamp,
            status: FileStatus::Processed,
            analysis: Some(analysis),
            details: None,
            processing_time_secs: Some(round2(elapsed_secs)),
        }
    }

    /// A stage of the pipeline failed.
    pub fn error(
        file_name: String,
        file_path: PathBuf,
        timestamp: DateTime<Local>,
        details: impl Into<String>,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            file_name,
            file_path,
            timestamp,
            status: FileStatus::Error,
            analysis: None,
            details: Some(details.into()),
            processing_time_secs: Some(round2(elapsed_secs)),
        }
    }

    /// The task processing the file crashed before producing a result.
    pub fn fatal(file_name: String, file_path: PathBuf, details: impl Into<String>) -> Self {
        Self {
            file_name,
            file_path,
            timestamp: Local::now(),
            status: FileStatus::FatalError,
            analysis: None,
            details: Some(details.into()),
            processing_time_secs: None,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == FileStatus::Processed
    }

    /// Append this result's report block to `out`.
    pub fn write_block(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "--- Result for: {} ---", self.file_name);
        let _ = writeln!(out, "Status: {}", self.status);
        match (&self.status, &self.analysis) {
            (FileStatus::Processed, Some(a)) => {
                let _ = writeln!(out, "Recommendation: {}", or_na(&a.recommendation));
                let _ = writeln!(out, "Is Relevant: {}", a.is_relevant);
                let _ = writeln!(out, "Confidence: {}", format_score(a.confidence_score));
                let _ = writeln!(out, "Primary Focus: {}", or_na(&a.primary_focus));
                let _ = writeln!(
                    out,
                    "Materials Identified: {}",
                    a.materials_identified.join(", ")
                );
                let _ = writeln!(out, "Key Evidence: {}", a.key_evidence.join(", "));
                let _ = writeln!(out, "Exclusion Reasons: {}", a.exclusion_reasons.join(", "));
            }
            _ => {
                let _ = writeln!(out, "Details: {}", self.details.as_deref().unwrap_or("N/A"));
            }
        }
        match self.processing_time_secs {
            Some(secs) => {
                let _ = writeln!(out, "Processing Time: {:.2}s", secs);
            }
            None => {
                let _ = writeln!(out, "Processing Time: N/A");
            }
        }
        out.push('\n');
    }
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        "N/A"
    } else {
        s
    }
}

/// Always show a decimal point, so 1 prints as `1.0` and 0.85 as `0.85`.
fn format_score(v: f64) -> String {
    format!("{:?}", v)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Every file result of a run, sorted by file name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreeningReport {
    results: Vec<FileResult>,
}

impl ScreeningReport {
    /// Take ownership of results in any order and sort them by file name
    /// (ties broken by path).
    pub fn from_results(mut results: Vec<FileResult>) -> Self {
        results.sort_by(|a, b| {
            a.file_name
                .cmp(&b.file_name)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        Self { results }
    }

    pub fn results(&self) -> &[FileResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Flat text rendering, one block per file.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.results.len() * 320);
        for result in &self.results {
            result.write_block(&mut out);
        }
        out
    }

    /// Pretty-printed JSON array of results.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.results)
    }

    /// Counts for the console summary.
    pub fn summary(&self) -> ScreeningSummary {
        let total = self.results.len();
        let processed = self.results.iter().filter(|r| r.is_processed()).count();

        let mut recommendations: BTreeMap<String, usize> = BTreeMap::new();
        if processed > 0 {
            for label in KNOWN_RECOMMENDATIONS {
                recommendations.insert(label.to_string(), 0);
            }
            for analysis in self.results.iter().filter_map(|r| r.analysis.as_ref()) {
                *recommendations
                    .entry(analysis.recommendation_label().to_string())
                    .or_insert(0) += 1;
            }
        }

        ScreeningSummary {
            total,
            processed,
            errors: total - processed,
            recommendations,
        }
    }
}

/// Aggregate counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningSummary {
    pub total: usize,
    pub processed: usize,
    /// `ERROR` plus `FATAL_ERROR` results.
    pub errors: usize,
    /// Empty unless at least one file was processed; then the known labels
    /// are always present and unexpected labels appear under their own text.
    pub recommendations: BTreeMap<String, usize>,
}

impl ScreeningSummary {
    /// Count for `label`, zero when absent.
    pub fn count(&self, label: &str) -> usize {
        self.recommendations.get(label).copied().unwrap_or(0)
    }

    /// Labels outside [`KNOWN_RECOMMENDATIONS`] with their counts.
    pub fn unexpected_labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.recommendations
            .iter()
            .filter(|(k, _)| !KNOWN_RECOMMENDATIONS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), *v))
    }
}
