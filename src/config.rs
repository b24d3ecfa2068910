//! Configuration types for document ingestion.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Every limit the pipeline enforces is a named
//! constant below so hosts can read the defaults and override any of them.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of PDF pages processed per document.
pub const DEFAULT_MAX_PAGES: usize = 8;
/// Pages per batch; a pause follows every batch.
pub const DEFAULT_BATCH_SIZE: usize = 2;
/// Pause between batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(500);
/// Bound on the full-fidelity render of a single page.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(25);
/// Bound on parsing a document (page count and full render).
pub const DEFAULT_DOCUMENT_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound on drawing a page at full fidelity.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(20);
/// Bound on parsing a document for a preview render.
pub const DEFAULT_PREVIEW_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on drawing a preview.
pub const DEFAULT_PREVIEW_RENDER_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound on a single recognition call.
pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_secs(60);
/// Pixels per PDF point at full fidelity.
pub const DEFAULT_RENDER_SCALE: f32 = 1.5;
/// Pixels per PDF point for previews.
pub const DEFAULT_PREVIEW_SCALE: f32 = 1.0;
/// Longest rendered edge at full fidelity.
pub const DEFAULT_MAX_DIMENSION: u32 = 1500;
/// Longest rendered edge for previews.
pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 800;
/// Upload size ceiling (100 MB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
/// Bytes sampled from the start of a PDF by the structural validator.
pub const DEFAULT_VALIDATION_SAMPLE_BYTES: usize = 8192;

/// Configuration for a [`crate::DocumentPipeline`].
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_ingest::IngestConfig;
/// use std::time::Duration;
///
/// let config = IngestConfig::builder()
///     .max_pages(4)
///     .page_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 4);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Maximum number of PDF pages OCR'd per document. Default: 8.
    ///
    /// Pages beyond the cap are skipped and a trailing note in the text says
    /// how many pages the document really has.
    pub max_pages: usize,

    /// Pages processed between two pauses. Default: 2.
    ///
    /// Pages are always processed one after another; the batch only decides
    /// where the recovery pause goes.
    pub batch_size: usize,

    /// Pause inserted after each batch. Default: 500 ms.
    pub batch_pause: Duration,

    /// Upper bound on the full-fidelity render of one page. Default: 25 s.
    pub page_timeout: Duration,

    /// Bound on parsing the document before counting or rendering. Default: 15 s.
    pub document_load_timeout: Duration,

    /// Bound on drawing one page at full fidelity. Default: 20 s.
    pub render_timeout: Duration,

    /// Bound on parsing the document for a preview render. Default: 10 s.
    pub preview_load_timeout: Duration,

    /// Bound on drawing one preview. Default: 15 s.
    pub preview_render_timeout: Duration,

    /// Bound on one recognition call. Default: 60 s.
    pub recognition_timeout: Duration,

    /// Pixels per PDF point at full fidelity. Default: 1.5.
    pub render_scale: f32,

    /// Pixels per PDF point for previews. Default: 1.0.
    pub preview_scale: f32,

    /// Longest edge of a full-fidelity page image. Default: 1500 px.
    ///
    /// Larger pages are downscaled uniformly, keeping the aspect ratio.
    pub max_dimension: u32,

    /// Longest edge of a preview image. Default: 800 px.
    pub preview_max_dimension: u32,

    /// Largest accepted upload. Default: 100 MB.
    pub max_file_size_bytes: u64,

    /// Bytes read from the start of a PDF for structural checks. Default: 8192.
    pub validation_sample_bytes: usize,

    /// How the PDF page count is determined.
    pub page_count_strategy: PageCountStrategy,

    /// Tesseract language codes, joined with `+`. Default: `["eng"]`.
    pub ocr_languages: Vec<String>,

    /// Tesseract executable. Default: `tesseract` (resolved on PATH).
    pub tesseract_binary: PathBuf,

    /// Explicit pdfium library path; `None` searches the working directory
    /// and then the system library path.
    pub pdfium_library: Option<PathBuf>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            document_load_timeout: DEFAULT_DOCUMENT_LOAD_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            preview_load_timeout: DEFAULT_PREVIEW_LOAD_TIMEOUT,
            preview_render_timeout: DEFAULT_PREVIEW_RENDER_TIMEOUT,
            recognition_timeout: DEFAULT_RECOGNITION_TIMEOUT,
            render_scale: DEFAULT_RENDER_SCALE,
            preview_scale: DEFAULT_PREVIEW_SCALE,
            max_dimension: DEFAULT_MAX_DIMENSION,
            preview_max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            validation_sample_bytes: DEFAULT_VALIDATION_SAMPLE_BYTES,
            page_count_strategy: PageCountStrategy::default(),
            ocr_languages: vec!["eng".to_string()],
            tesseract_binary: PathBuf::from("tesseract"),
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("max_pages", &self.max_pages)
            .field("batch_size", &self.batch_size)
            .field("batch_pause", &self.batch_pause)
            .field("page_timeout", &self.page_timeout)
            .field("document_load_timeout", &self.document_load_timeout)
            .field("render_timeout", &self.render_timeout)
            .field("preview_load_timeout", &self.preview_load_timeout)
            .field("preview_render_timeout", &self.preview_render_timeout)
            .field("recognition_timeout", &self.recognition_timeout)
            .field("render_scale", &self.render_scale)
            .field("preview_scale", &self.preview_scale)
            .field("max_dimension", &self.max_dimension)
            .field("preview_max_dimension", &self.preview_max_dimension)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("page_count_strategy", &self.page_count_strategy)
            .field("ocr_languages", &self.ocr_languages)
            .field("tesseract_binary", &self.tesseract_binary)
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Languages in the form tesseract expects (`eng+deu`).
    pub fn tesseract_languages(&self) -> String {
        if self.ocr_languages.is_empty() {
            "eng".to_string()
        } else {
            self.ocr_languages.join("+")
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.config.batch_pause = pause;
        self
    }

    pub fn page_timeout(mut self, t: Duration) -> Self {
        self.config.page_timeout = t;
        self
    }

    pub fn document_load_timeout(mut self, t: Duration) -> Self {
        self.config.document_load_timeout = t;
        self
    }

    pub fn render_timeout(mut self, t: Duration) -> Self {
        self.config.render_timeout = t;
        self
    }

    pub fn preview_load_timeout(mut self, t: Duration) -> Self {
        self.config.preview_load_timeout = t;
        self
    }

    pub fn preview_render_timeout(mut self, t: Duration) -> Self {
        self.config.preview_render_timeout = t;
        self
    }

    pub fn recognition_timeout(mut self, t: Duration) -> Self {
        self.config.recognition_timeout = t;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.25, 4.0);
        self
    }

    pub fn preview_scale(mut self, scale: f32) -> Self {
        self.config.preview_scale = scale.clamp(0.25, 4.0);
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(100);
        self
    }

    pub fn preview_max_dimension(mut self, px: u32) -> Self {
        self.config.preview_max_dimension = px.max(100);
        self
    }

    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    pub fn validation_sample_bytes(mut self, bytes: usize) -> Self {
        self.config.validation_sample_bytes = bytes.max(8);
        self
    }

    pub fn page_count_strategy(mut self, strategy: PageCountStrategy) -> Self {
        self.config.page_count_strategy = strategy;
        self
    }

    pub fn ocr_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr_languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        let bounds = [
            ("page_timeout", c.page_timeout),
            ("document_load_timeout", c.document_load_timeout),
            ("render_timeout", c.render_timeout),
            ("preview_load_timeout", c.preview_load_timeout),
            ("preview_render_timeout", c.preview_render_timeout),
            ("recognition_timeout", c.recognition_timeout),
        ];
        if let Some((name, _)) = bounds.iter().find(|(_, d)| d.is_zero()) {
            return Err(IngestError::InvalidConfig(format!(
                "{name} must be greater than zero"
            )));
        }
        if c.max_file_size_bytes == 0 {
            return Err(IngestError::InvalidConfig(
                "max_file_size_bytes must be greater than zero".into(),
            ));
        }
        if c.preview_max_dimension > c.max_dimension {
            return Err(IngestError::InvalidConfig(format!(
                "preview_max_dimension ({}) must not exceed max_dimension ({})",
                c.preview_max_dimension, c.max_dimension
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the page count of a PDF is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCountStrategy {
    /// Parse the page tree; any failure is fatal.
    Authoritative,
    /// Scan the raw bytes for page markers; never fails.
    Heuristic,
    /// Parse the page tree, falling back to the scan unless the document
    /// is password-protected. (default)
    #[default]
    AuthoritativeWithFallback,
}
