//! CLI binary for paper-screener.
//!
//! A thin shim over the library crate that maps a JSON config file plus CLI
//! flags to `ScreeningConfig`, drives the run and prints the summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_screener::prompts::DEFAULT_PROMPT_TEMPLATE;
use paper_screener::{
    ReportFormat, Screener, ScreenerError, ScreeningConfig, ScreeningConfigBuilder,
    ScreeningProgressCallback, ScreeningSummary,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over files plus one log line per
/// finished file. Files may finish out of order when `--workers` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the file count.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} papers  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Screening");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, file_name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(file_name))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ScreeningProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Screening {total_files} papers…"))
        ));
    }

    fn on_file_start(&self, file_name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(file_name.to_string(), Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_file_complete(&self, file_name: &str, recommendation: &str) {
        let secs = self.elapsed_secs(file_name);
        let label = match recommendation {
            "KEEP" => green(recommendation),
            "EXCLUDE" => red(recommendation),
            _ => yellow(recommendation),
        };
        self.bar.println(format!(
            "  {} {:<48} {:<8} {}",
            green("✓"),
            file_name,
            label,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, file_name: &str, error: &str) {
        let secs = self.elapsed_secs(file_name);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:<48} {}  {}",
            red("✗"),
            file_name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, summary: &ScreeningSummary) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} papers screened successfully",
                green("✔"),
                bold(&summary.processed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} papers screened  ({} failed)",
                if failed == summary.total {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&summary.processed.to_string()),
                summary.total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Screen ./papers with the settings in config.json
  paper-screener

  # Start a new project
  paper-screener --print-default-config > config.json
  paper-screener --print-default-template > prompts/analysis_prompt_template.txt

  # Another folder, four parallel workers, JSON report
  paper-screener --input ~/review/batch2 --workers 4 --json -o batch2.json

  # Keep a log file next to the report
  paper-screener --log-file literature_screener.log

CONFIG FILE KEYS (all optional):
  api_provider, api_key, api_key_env, base_url, model_name, pdf_folder,
  output_file, max_workers, max_pages_per_pdf, prompt_template_file,
  max_tokens, max_attempts, retry_initial_ms, retry_max_ms,
  request_delay_ms, api_timeout_secs, min_text_chars, file_extension,
  report_format

  An empty "base_url" selects a named provider (openai, anthropic, gemini,
  ollama, …) that reads its own API key variable.

ENVIRONMENT VARIABLES:
  DASHSCOPE_API_KEY       API key when not set in the config file
                          (variable name configurable via api_key_env)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides the log filter

PROMPT TEMPLATE:
  A text file with one {paper_text} placeholder. The model must answer with
  the lines is_relevant, confidence_score, primary_focus, recommendation,
  materials_identified, key_evidence and exclusion_reasons, one
  "key: value" pair per line.
"#;

/// Screen a folder of academic PDFs for topic relevance with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "paper-screener",
    version,
    about = "Screen a folder of academic PDFs for topic relevance with an LLM",
    long_about = "Extracts the opening pages of every PDF in a folder, asks an LLM to judge \
each paper against your prompt template, and writes one report with a KEEP / REVIEW / \
EXCLUDE recommendation per paper. Works with DashScope (Qwen), any OpenAI-compatible \
endpoint, and the providers supported by edgequake-llm.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, env = "PAPER_SCREENER_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Folder containing the PDFs (overrides `pdf_folder`).
    #[arg(short, long, env = "PAPER_SCREENER_INPUT")]
    input: Option<PathBuf>,

    /// Report file (overrides `output_file`).
    #[arg(short, long, env = "PAPER_SCREENER_OUTPUT")]
    output: Option<PathBuf>,

    /// Papers screened in parallel (overrides `max_workers`).
    #[arg(short, long, env = "PAPER_SCREENER_WORKERS")]
    workers: Option<usize>,

    /// Model ID (overrides `model_name`).
    #[arg(long, env = "PAPER_SCREENER_MODEL")]
    model: Option<String>,

    /// Pages read per PDF (overrides `max_pages_per_pdf`).
    #[arg(long, env = "PAPER_SCREENER_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Write the report as JSON instead of text blocks.
    #[arg(long, env = "PAPER_SCREENER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_SCREENER_NO_PROGRESS")]
    no_progress: bool,

    /// Also append logs to this file.
    #[arg(long, env = "PAPER_SCREENER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_SCREENER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER_SCREENER_QUIET")]
    quiet: bool,

    /// Print a config file with every default and exit.
    #[arg(long)]
    print_default_config: bool,

    /// Print a starter prompt template and exit.
    #[arg(long)]
    print_default_template: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("{} {:#}", red("✘"), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.print_default_config {
        let json = serde_json::to_string_pretty(&ScreeningConfig::default())
            .context("Failed to serialise default config")?;
        println!("{json}");
        return Ok(());
    }
    if cli.print_default_template {
        print!("{DEFAULT_PROMPT_TEMPLATE}");
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs on the terminal when the progress bar
    // is active; the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = terminal_log_level(cli.verbose, cli.quiet, show_progress);
    let _log_guard = init_logging(filter, cli.verbose, cli.log_file.as_deref())?;

    if !cli.quiet {
        print_banner();
    }

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).map_err(report_config_error)?;
    info!("Configuration: {:?}", config);

    let mut screener = Screener::from_config(config).map_err(report_config_error)?;
    if show_progress {
        let cb = CliProgressCallback::new();
        screener = screener.with_progress(cb as Arc<dyn ScreeningProgressCallback>);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let report = screener.run().await.context("Screening failed")?;
    let summary = report.summary();

    if !cli.quiet {
        print_summary(
            &summary,
            &screener.config().output_file,
            started.elapsed(),
        );
    }
    Ok(())
}

/// Default config → JSON file overlay → CLI flags.
fn build_config(cli: &Cli) -> std::result::Result<ScreeningConfig, ScreenerError> {
    let base = ScreeningConfig::from_file(&cli.config)?;
    let mut builder = ScreeningConfigBuilder::from_config(base);

    if let Some(ref dir) = cli.input {
        builder = builder.input_dir(dir);
    }
    if let Some(ref path) = cli.output {
        builder = builder.output_file(path);
    }
    if let Some(n) = cli.workers {
        builder = builder.workers(n);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(n) = cli.max_pages {
        builder = builder.max_pages(n);
    }
    if cli.json {
        builder = builder.report_format(ReportFormat::Json);
    }
    builder.build()
}

/// Log a startup error and turn it into the process error.
fn report_config_error(e: ScreenerError) -> anyhow::Error {
    error!("Configuration errors found, exiting: {}", e);
    anyhow::Error::new(e).context("Cannot start screening")
}

/// Level for the stderr layer when `RUST_LOG` is unset.
fn terminal_log_level(verbose: bool, quiet: bool, show_progress: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet || show_progress {
        "error"
    } else {
        "info"
    }
}

/// Level for the `--log-file` layer. Ignores the progress bar and `--quiet`.
fn file_log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the stderr subscriber and, with `--log-file`, a second layer
/// writing plain text to that file. Each layer carries its own filter.
/// The returned guard flushes the file writer on drop.
fn init_logging(
    filter: &str,
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(verbose)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {:?}", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(file_log_level(verbose)));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

fn print_banner() {
    eprintln!("{}", bold("=================================================="));
    eprintln!(
        "{}",
        bold(&format!(
            "  Paper Screener v{}",
            env!("CARGO_PKG_VERSION")
        ))
    );
    eprintln!("{}", bold("=================================================="));
}

fn print_summary(summary: &ScreeningSummary, output: &Path, elapsed: Duration) {
    eprintln!();
    eprintln!("{}", bold("--- Screening Summary ---"));
    eprintln!("Total files found:         {}", summary.total);
    eprintln!("Successfully processed:    {}", green(&summary.processed.to_string()));
    if summary.errors > 0 {
        eprintln!("Errors:                    {}", red(&summary.errors.to_string()));
    } else {
        eprintln!("Errors:                    {}", summary.errors);
    }

    if summary.processed > 0 {
        eprintln!();
        eprintln!("{}", bold("Recommendations:"));
        eprintln!("  Keep:    {}", summary.count("KEEP"));
        eprintln!("  Review:  {}", summary.count("REVIEW"));
        eprintln!("  Exclude: {}", summary.count("EXCLUDE"));
        eprintln!("  N/A:     {}", summary.count("N/A"));
        for (label, count) in summary.unexpected_labels() {
            eprintln!("  {}: {}", label, count);
        }
    }

    eprintln!();
    if summary.total > 0 {
        eprintln!(
            "{} Results written to {}  {}",
            green("✔"),
            bold(&output.display().to_string()),
            dim(&format!("({:.1}s)", elapsed.as_secs_f64()))
        );
    } else {
        eprintln!("{} No papers to screen; no report written.", cyan("⚠"));
    }
}
