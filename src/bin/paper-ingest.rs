//! CLI binary for paper-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_ingest::{
    DocumentPipeline, ExtractionProgressCallback, IngestConfig, IngestError, PageCountStrategy,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar at the bottom plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner-only until `on_extraction_start` tells us the page total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Counting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("OCR");
    }

    fn elapsed(&self, page_num: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>2}/{:<2}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            self.elapsed(page_num),
        ));
        self.bar.inc(1);
    }

    fn on_page_fallback(&self, page_num: usize, _total: usize, reason: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>2}  {}",
            yellow("↺"),
            page_num,
            dim(&truncate(reason, 80)),
        ));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>2}/{:<2}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            self.elapsed(page_num),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 && fallbacks == 0 {
            eprintln!(
                "{} {} page(s) read successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) read  ({} via preview, {} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                fallbacks,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a past paper to stdout
  paper-ingest maths-2021.pdf

  # Structured output with per-page outcomes
  paper-ingest --json maths-2021.pdf > maths-2021.json

  # Check a PDF before uploading it
  paper-ingest --validate-only maths-2021.pdf

  # Page count only
  paper-ingest --count-pages maths-2021.pdf

  # Scanned photo, German + English
  paper-ingest --lang deu --lang eng photo.jpg

SUPPORTED INPUTS:
  .pdf                         rasterised with pdfium, OCR'd page by page
  .png .jpg .jpeg .gif .bmp    OCR'd as a single image
  .tif .tiff
  .docx                        raw text, no OCR

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH              Path to libpdfium (file or directory)
  PAPER_INGEST_TESSERACT       Path to the tesseract binary
  PAPER_INGEST_MAX_PAGES       Page cap per PDF (default 8)
  RUST_LOG                     Override log filter

EXIT STATUS:
  0 on success; otherwise 1, with the suggested HTTP status of the error
  printed on stderr (400 input rejected, 408 timeout, 429 busy, 500 fatal).
"#;

/// Extract text from exam-paper uploads (PDF, images, DOCX) with OCR.
#[derive(Parser, Debug)]
#[command(
    name = "paper-ingest",
    version,
    about = "Extract text from exam-paper uploads (PDF, images, DOCX) with OCR",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Upload to process.
    input: PathBuf,

    /// Write text to this file instead of stdout.
    #[arg(short, long, env = "PAPER_INGEST_OUTPUT")]
    output: Option<PathBuf>,

    /// Output structured JSON (ExtractionOutput) instead of plain text.
    #[arg(long, env = "PAPER_INGEST_JSON")]
    json: bool,

    /// Only run the structural PDF checks and print the report.
    #[arg(long, conflicts_with = "count_pages")]
    validate_only: bool,

    /// Only print the page count.
    #[arg(long)]
    count_pages: bool,

    /// Maximum number of PDF pages to OCR.
    #[arg(long, env = "PAPER_INGEST_MAX_PAGES", default_value_t = paper_ingest::config::DEFAULT_MAX_PAGES)]
    max_pages: usize,

    /// Pages per batch; a short pause follows each batch.
    #[arg(long, env = "PAPER_INGEST_BATCH_SIZE", default_value_t = paper_ingest::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Pause between batches, in milliseconds.
    #[arg(long, env = "PAPER_INGEST_BATCH_PAUSE_MS", default_value_t = 500)]
    batch_pause_ms: u64,

    /// Per-page render timeout in seconds.
    #[arg(long, env = "PAPER_INGEST_PAGE_TIMEOUT", default_value_t = 25)]
    page_timeout: u64,

    /// Per-call OCR timeout in seconds.
    #[arg(long, env = "PAPER_INGEST_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// Longest edge of a rendered page in pixels.
    #[arg(long, env = "PAPER_INGEST_MAX_DIMENSION", default_value_t = paper_ingest::config::DEFAULT_MAX_DIMENSION)]
    max_dimension: u32,

    /// Largest accepted upload in megabytes.
    #[arg(long, env = "PAPER_INGEST_MAX_FILE_MB", default_value_t = 100)]
    max_file_mb: u64,

    /// How to count PDF pages.
    #[arg(long, env = "PAPER_INGEST_PAGE_COUNT", value_enum, default_value = "auto")]
    page_count: PageCountArg,

    /// Tesseract language code; repeat for several.
    #[arg(long = "lang", env = "PAPER_INGEST_LANG", value_delimiter = ',', default_value = "eng")]
    languages: Vec<String>,

    /// Tesseract executable.
    #[arg(long, env = "PAPER_INGEST_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER_INGEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageCountArg {
    /// pdfium, falling back to a byte scan.
    Auto,
    /// pdfium only.
    Exact,
    /// Byte scan only.
    Estimate,
}

impl From<PageCountArg> for PageCountStrategy {
    fn from(v: PageCountArg) -> Self {
        match v {
            PageCountArg::Auto => PageCountStrategy::AuthoritativeWithFallback,
            PageCountArg::Exact => PageCountStrategy::Authoritative,
            PageCountArg::Estimate => PageCountStrategy::Heuristic,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.validate_only && !cli.count_pages;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = e
                .downcast_ref::<IngestError>()
                .map(IngestError::suggested_status)
                .unwrap_or(500);
            eprintln!("{} {:#}", red("error:"), e);
            eprintln!("{}", dim(&format!("suggested status: {status}")));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let pipeline = DocumentPipeline::new(config);

    // ── Validate-only mode ───────────────────────────────────────────────
    if cli.validate_only {
        let report = pipeline.validate(&cli.input).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else {
            println!("File:    {}", cli.input.display());
            println!(
                "Valid:   {}",
                if report.is_valid { green("yes") } else { red("no") }
            );
            for issue in &report.issues {
                println!("  [{:?}] {}", issue.severity, issue.message);
            }
            for rec in &report.recommendations {
                println!("  → {rec}");
            }
        }
        return Ok(());
    }

    // ── Count-only mode ──────────────────────────────────────────────────
    if cli.count_pages {
        let count = pipeline.count_pages(&cli.input).await?;
        if cli.json {
            println!(
                "{}",
                serde_json::json!({ "pages": count.pages, "estimated": count.estimated })
            );
        } else {
            println!("{}", count.pages);
            if let Some(w) = count.warning {
                eprintln!("{} {}", yellow("warning:"), w);
            }
        }
        return Ok(());
    }

    // ── Full ingestion ───────────────────────────────────────────────────
    let output = pipeline.ingest(&cli.input).await?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.text.clone()
    };

    match cli.output {
        Some(ref path) => tokio::fs::write(path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet && !cli.json {
        for w in &output.warnings {
            eprintln!("{} {}", yellow("warning:"), w);
        }
        eprintln!(
            "{}  {}/{} page(s)  {}ms",
            if output.failed_pages().next().is_none() {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.pages_processed,
            output.page_count,
            output.processing_time_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .max_pages(cli.max_pages)
        .batch_size(cli.batch_size)
        .batch_pause(Duration::from_millis(cli.batch_pause_ms))
        .page_timeout(Duration::from_secs(cli.page_timeout))
        .recognition_timeout(Duration::from_secs(cli.ocr_timeout))
        .max_dimension(cli.max_dimension)
        .max_file_size_bytes(cli.max_file_mb.saturating_mul(1024 * 1024))
        .page_count_strategy(cli.page_count.clone().into())
        .ocr_languages(cli.languages.iter().cloned())
        .tesseract_binary(cli.tesseract.clone());

    if let Some(ref lib) = cli.pdfium {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
