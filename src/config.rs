//! Configuration types for a screening run.
//!
//! All run behaviour is controlled through [`ScreeningConfig`]. A config is
//! assembled in explicit layers, each overriding the previous one field by
//! field:
//!
//! 1. [`ScreeningConfig::default()`] — the built-in defaults;
//! 2. a JSON file parsed into [`ConfigFile`] (every key optional) and applied
//!    with [`ScreeningConfig::overlay`];
//! 3. command-line overrides through [`ScreeningConfigBuilder`] setters.
//!
//! [`ScreeningConfig::validate`] then checks the result against the file
//! system and environment before any work starts.

use crate::error::ScreenerError;
use crate::pipeline::input::discover_documents;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// API key value shipped in example config files; treated as "not set".
pub const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Configuration for a screening run.
///
/// Built via [`ScreeningConfig::builder()`], [`ScreeningConfig::from_file`]
/// or [`ScreeningConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_screener::ScreeningConfig;
///
/// let config = ScreeningConfig::builder()
///     .workers(4)
///     .model("qwen-plus")
///     .input_dir("./papers")
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone, Serialize)]
pub struct ScreeningConfig {
    /// Provider identity, e.g. "qwen", "openai", "anthropic". Default: "qwen".
    ///
    /// With a `base_url` the name is only a label in logs; without one it
    /// selects an `edgequake-llm` provider by name.
    #[serde(rename = "api_provider")]
    pub provider: String,

    /// API key. `None` (or the example placeholder) falls back to `api_key_env`.
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset. Default: `DASHSCOPE_API_KEY`.
    pub api_key_env: String,

    /// OpenAI-compatible endpoint root (`…/v1`). `None` selects the named-provider backend.
    pub base_url: Option<String>,

    /// Model identifier. Default: "qwen-vl-max".
    #[serde(rename = "model_name")]
    pub model: String,

    /// Folder scanned (non-recursively) for documents. Default: `./papers`.
    #[serde(rename = "pdf_folder")]
    pub input_dir: PathBuf,

    /// Report destination. Default: `screening_results.txt`.
    pub output_file: PathBuf,

    /// Number of documents screened in parallel. Default: 1 (sequential).
    ///
    /// Most hosted endpoints rate-limit per key; raise this only if the
    /// provider tolerates concurrent requests.
    #[serde(rename = "max_workers")]
    pub workers: usize,

    /// Pages read from the start of each document. Default: 10.
    ///
    /// Title, abstract, introduction and methods almost always sit in the
    /// first ten pages, which is all a relevance decision needs.
    #[serde(rename = "max_pages_per_pdf")]
    pub max_pages: usize,

    /// Prompt template containing a single `{paper_text}` placeholder.
    #[serde(rename = "prompt_template_file")]
    pub prompt_template: PathBuf,

    /// Completion token budget per document. Default: 1500.
    pub max_tokens: usize,

    /// Attempts per completion call, first call included. Default: 3.
    pub max_attempts: u32,

    /// First wait between attempts in milliseconds; doubles each retry. Default: 4000.
    pub retry_initial_ms: u64,

    /// Upper bound on the wait between attempts in milliseconds. Default: 10000.
    pub retry_max_ms: u64,

    /// Pacing delay before every request in milliseconds. Default: 1000.
    pub request_delay_ms: u64,

    /// HTTP timeout for one completion request in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Minimum trimmed length of extracted text worth sending. Default: 200.
    pub min_text_chars: usize,

    /// File extension (without dot, case-insensitive) of candidate documents. Default: "pdf".
    #[serde(rename = "file_extension")]
    pub extension: String,

    /// Report layout. Default: [`ReportFormat::Text`].
    pub report_format: ReportFormat,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            provider: "qwen".to_string(),
            api_key: None,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            base_url: Some("https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()),
            model: "qwen-vl-max".to_string(),
            input_dir: PathBuf::from("./papers"),
            output_file: PathBuf::from("screening_results.txt"),
            workers: 1,
            max_pages: 10,
            prompt_template: PathBuf::from("./prompts/analysis_prompt_template.txt"),
            max_tokens: 1500,
            max_attempts: 3,
            retry_initial_ms: 4000,
            retry_max_ms: 10_000,
            request_delay_ms: 1000,
            api_timeout_secs: 120,
            min_text_chars: 200,
            extension: "pdf".to_string(),
            report_format: ReportFormat::default(),
        }
    }
}

impl fmt::Debug for ScreeningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreeningConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("input_dir", &self.input_dir)
            .field("output_file", &self.output_file)
            .field("workers", &self.workers)
            .field("max_pages", &self.max_pages)
            .field("prompt_template", &self.prompt_template)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("report_format", &self.report_format)
            .finish()
    }
}

impl ScreeningConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> ScreeningConfigBuilder {
        ScreeningConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a JSON config file and overlay it on the defaults.
    ///
    /// Unknown keys are ignored; absent keys keep their default.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScreenerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScreenerError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ScreenerError::ConfigParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| ScreenerError::ConfigParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let mut config = Self::default();
        config.overlay(file);
        info!("Configuration loaded from '{}'", path.display());
        Ok(config)
    }

    /// Apply every value present in `file` over the current one.
    pub fn overlay(&mut self, file: ConfigFile) {
        if let Some(v) = file.api_provider {
            self.provider = v;
        }
        if let Some(v) = file.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file.api_key_env {
            self.api_key_env = v;
        }
        if let Some(v) = file.base_url {
            // An empty string explicitly disables the OpenAI-compatible backend.
            self.base_url = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = file.model_name {
            self.model = v;
        }
        if let Some(v) = file.pdf_folder {
            self.input_dir = v;
        }
        if let Some(v) = file.output_file {
            self.output_file = v;
        }
        if let Some(v) = file.max_workers {
            self.workers = v;
        }
        if let Some(v) = file.max_pages_per_pdf {
            self.max_pages = v;
        }
        if let Some(v) = file.prompt_template_file {
            self.prompt_template = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = file.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = file.retry_initial_ms {
            self.retry_initial_ms = v;
        }
        if let Some(v) = file.retry_max_ms {
            self.retry_max_ms = v;
        }
        if let Some(v) = file.request_delay_ms {
            self.request_delay_ms = v;
        }
        if let Some(v) = file.api_timeout_secs {
            self.api_timeout_secs = v;
        }
        if let Some(v) = file.min_text_chars {
            self.min_text_chars = v;
        }
        if let Some(v) = file.file_extension {
            self.extension = v;
        }
        if let Some(v) = file.report_format {
            self.report_format = v;
        }
    }

    /// The effective API key: the configured value, else the environment
    /// variable named by `api_key_env`. Empty strings and the example
    /// placeholder count as unset.
    pub fn resolved_api_key(&self) -> Option<String> {
        let usable = |k: &str| !k.trim().is_empty() && k != API_KEY_PLACEHOLDER;

        if let Some(ref key) = self.api_key {
            if usable(key) {
                return Some(key.clone());
            }
        }
        std::env::var(&self.api_key_env).ok().filter(|k| usable(k))
    }

    /// Check the config against the environment and file system.
    ///
    /// Every problem is collected so the user can fix them in one pass.
    pub fn validate(&self) -> Result<(), ScreenerError> {
        let mut problems = Vec::new();

        if self.workers == 0 {
            problems.push("'max_workers' must be at least 1.".to_string());
        }
        if self.max_attempts == 0 {
            problems.push("'max_attempts' must be at least 1.".to_string());
        }
        if self.max_pages == 0 {
            problems.push("'max_pages_per_pdf' must be at least 1.".to_string());
        }

        if self.base_url.is_some() && self.resolved_api_key().is_none() {
            problems.push(format!(
                "API key is not set. Set 'api_key' in the config file or the {} environment variable.",
                self.api_key_env
            ));
        }

        if !self.input_dir.is_dir() {
            problems.push(format!(
                "PDF folder '{}' does not exist.",
                self.input_dir.display()
            ));
        } else {
            match discover_documents(&self.input_dir, &self.extension) {
                Ok(docs) if docs.is_empty() => problems.push(format!(
                    "No .{} files found in '{}'.",
                    self.extension,
                    self.input_dir.display()
                )),
                Ok(docs) => info!(
                    "Found {} .{} file(s) in '{}'",
                    docs.len(),
                    self.extension,
                    self.input_dir.display()
                ),
                Err(e) => problems.push(e.to_string()),
            }
        }

        if !self.prompt_template.is_file() {
            problems.push(format!(
                "Prompt template file '{}' not found.",
                self.prompt_template.display()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ScreenerError::InvalidConfig { problems })
        }
    }
}

/// On-disk shape of the JSON config file: every key optional, unknown keys
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub api_provider: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub pdf_folder: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub max_pages_per_pdf: Option<usize>,
    pub prompt_template_file: Option<PathBuf>,
    pub max_tokens: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_initial_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
    pub request_delay_ms: Option<u64>,
    pub api_timeout_secs: Option<u64>,
    pub min_text_chars: Option<usize>,
    pub file_extension: Option<String>,
    pub report_format: Option<ReportFormat>,
}

/// Builder for [`ScreeningConfig`].
#[derive(Debug)]
pub struct ScreeningConfigBuilder {
    config: ScreeningConfig,
}

impl ScreeningConfigBuilder {
    /// Start from an already-loaded config instead of the defaults.
    pub fn from_config(config: ScreeningConfig) -> Self {
        Self { config }
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider = name.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: Option<String>) -> Self {
        self.config.base_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_file = path.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn prompt_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.prompt_template = path.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    /// Set the backoff window: first wait and cap, both in milliseconds.
    pub fn retry_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.retry_initial_ms = initial;
        self.config.retry_max_ms = max.max(initial);
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn report_format(mut self, format: ReportFormat) -> Self {
        self.config.report_format = format;
        self
    }

    /// Build the configuration, checking value constraints.
    ///
    /// File-system checks live in [`ScreeningConfig::validate`] so a config
    /// can be built before the folders it names exist.
    pub fn build(self) -> Result<ScreeningConfig, ScreenerError> {
        let c = &self.config;
        let mut problems = Vec::new();
        if c.workers == 0 {
            problems.push("Worker count must be ≥ 1".to_string());
        }
        if c.max_attempts == 0 {
            problems.push("Attempt count must be ≥ 1".to_string());
        }
        if c.extension.is_empty() {
            problems.push("File extension must not be empty".to_string());
        }
        if !problems.is_empty() {
            return Err(ScreenerError::InvalidConfig { problems });
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Layout of the written report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One `--- Result for: … ---` block per file. (default)
    #[default]
    Text,
    /// Pretty-printed JSON array of file results.
    Json,
}
