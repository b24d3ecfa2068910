//! # paper-ingest
//!
//! Turn uploaded exam papers (PDF, scanned images, Word files) into plain
//! text for downstream question generation.
//!
//! ## Why this crate?
//!
//! Past papers arrive as whatever students have: phone photos, scanned
//! PDFs with embedded 3D diagrams, 200-page compilations, Word exports. A
//! single malformed page must not sink the whole upload, and a single upload
//! must not starve the server. This crate validates uploads cheaply before
//! touching them, rasterises PDF pages under strict time and size bounds,
//! OCRs them one at a time with a degraded fallback render, and stitches
//! the result into one text blob with explicit markers wherever a page
//! could not be read.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 0. Gate      one upload at a time; others get Busy
//!  ├─ 1. Input     classify by extension, check size
//!  ├─ 2. Validate  8 KB structural scan (header, encryption, 3D, size)
//!  ├─ 3. Count     pdfium page tree, byte-scan fallback
//!  ├─ 4. Render    pdfium, 1.5x, ≤1500 px, spawn_blocking + timeouts
//!  ├─ 5. OCR       tesseract per page; preview render on failure
//!  └─ 6. Output    stitched text + per-page outcomes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_ingest::{DocumentPipeline, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = DocumentPipeline::new(IngestConfig::default());
//!     let output = pipeline.ingest("maths-2021-paper1.pdf").await?;
//!     println!("{}", output.text);
//!     eprintln!("{} of {} pages in {}ms",
//!         output.pages_processed,
//!         output.page_count,
//!         output.processing_time_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-ingest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! | Dependency | Used for | Located via |
//! |------------|----------|-------------|
//! | pdfium     | page counting, rendering | `PDFIUM_LIB_PATH`, `./`, system path |
//! | tesseract  | OCR of images and pages  | `PATH` (or an explicit binary) |
//!
//! pdfium is loaded on the first PDF, so image uploads need only tesseract
//! and Word documents need neither.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bounded;
pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bounded::{run_with_timeout, TimeoutError};
pub use config::{IngestConfig, IngestConfigBuilder, PageCountStrategy};
pub use error::{EngineError, ErrorClass, IngestError, PageCountError, PageError};
pub use gate::{GatePermit, NoopGate, ProcessingGate, UploadGate};
pub use ingest::{ingest_sync, DocumentPipeline};
pub use output::{ExtractionOutput, PageOutcome, PageStatus};
pub use pipeline::input::{DocumentKind, SourceDocument};
pub use pipeline::ocr::{EngineFactory, RecognitionEngine, TesseractCliFactory};
pub use pipeline::page_count::{estimate_page_count, PageCount};
pub use pipeline::render::{fit_within, PageImage, PageRasterizer, PdfiumRasterizer, RenderingEnvironment};
pub use pipeline::validate::{validate_pdf, Severity, ValidationIssue, ValidationLimits, ValidationReport};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
