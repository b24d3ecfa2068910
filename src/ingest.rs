//! Ingestion entry points.
//!
//! [`DocumentPipeline`] wires the stages together: it takes the upload
//! slot, resolves and validates the file, extracts its text and gives the
//! slot back on every exit path. The individual stages are exposed too, for
//! hosts that want to validate or count pages before accepting an upload.

use crate::config::{IngestConfig, PageCountStrategy};
use crate::error::IngestError;
use crate::extract::Extractor;
use crate::gate::{GatePermit, ProcessingGate, UploadGate};
use crate::output::ExtractionOutput;
use crate::pipeline::input::{resolve_source, DocumentKind};
use crate::pipeline::ocr::{EngineFactory, TesseractCliFactory};
use crate::pipeline::page_count::{determine_page_count, PageCount};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer, RenderingEnvironment};
use crate::pipeline::validate::{validate_pdf, ValidationLimits, ValidationReport};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The configured ingestion pipeline.
///
/// Cheap to clone; all collaborators are shared.
///
/// # Example
/// ```rust,no_run
/// use paper_ingest::{DocumentPipeline, IngestConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = DocumentPipeline::new(IngestConfig::default());
/// let output = pipeline.ingest("past-paper-2019.pdf").await?;
/// println!("{}", output.text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentPipeline {
    config: Arc<IngestConfig>,
    rasterizer: Arc<dyn PageRasterizer>,
    engines: Arc<dyn EngineFactory>,
    gate: Arc<dyn UploadGate>,
}

impl DocumentPipeline {
    /// Build the default pipeline: pdfium rasteriser, tesseract engine and
    /// the process-wide gate.
    ///
    /// pdfium is loaded on the first PDF, so Word and image uploads work
    /// without it. A missing library surfaces as
    /// [`IngestError::PdfiumBindingFailed`] from that first PDF.
    pub fn new(config: IngestConfig) -> Self {
        let env = RenderingEnvironment::deferred(config.pdfium_library.clone());
        Self::with_environment(config, env)
    }

    /// Build the default pipeline around an existing environment.
    pub fn with_environment(config: IngestConfig, env: Arc<RenderingEnvironment>) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::new(env, &config));
        let engines = Arc::new(TesseractCliFactory::from_config(&config));
        Self::with_components(config, rasterizer, engines, ProcessingGate::global())
    }

    /// Build a pipeline from explicit collaborators.
    pub fn with_components(
        config: IngestConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        engines: Arc<dyn EngineFactory>,
        gate: Arc<dyn UploadGate>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rasterizer,
            engines,
            gate,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_engine_factory(mut self, engines: Arc<dyn EngineFactory>) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn UploadGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest the upload at `path`.
    ///
    /// Holds the upload slot for the whole call. The caller keeps ownership
    /// of the file.
    ///
    /// # Errors
    /// [`IngestError::Busy`] when another upload holds the slot, an input
    /// rejection for bad files (including an invalid PDF report), or a fatal
    /// extraction error.
    pub async fn ingest(&self, path: impl AsRef<Path>) -> Result<ExtractionOutput, IngestError> {
        let path = path.as_ref();
        let request_id = uuid::Uuid::new_v4().to_string();
        let _permit =
            GatePermit::acquire(Arc::clone(&self.gate), &request_id).ok_or(IngestError::Busy)?;
        info!("Ingesting {} (request {})", path.display(), request_id);

        let source = resolve_source(path, self.config.max_file_size_bytes).await?;

        let mut validation_warnings = Vec::new();
        if source.kind == DocumentKind::Pdf {
            let report = self.validate(&source.path).await;
            if !report.is_valid {
                let message = report
                    .primary_error()
                    .unwrap_or("The PDF failed structural validation.")
                    .to_string();
                warn!("Rejecting {}: {}", path.display(), message);
                return Err(IngestError::InvalidPdf { message, report });
            }
            validation_warnings.extend(report.warnings().map(|i| i.message.clone()));
        }

        let mut output = self.extractor().extract(&source).await?;
        if !validation_warnings.is_empty() {
            validation_warnings.append(&mut output.warnings);
            output.warnings = validation_warnings;
        }
        Ok(output)
    }

    /// Ingest an in-memory upload.
    ///
    /// `extension` (with or without the leading dot) decides how the bytes
    /// are treated. They are written to a managed temporary file that is
    /// removed when this returns.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        extension: &str,
    ) -> Result<ExtractionOutput, IngestError> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if DocumentKind::from_extension(&extension).is_none() {
            return Err(IngestError::UnsupportedFormat { extension });
        }
        let mut tmp = tempfile::Builder::new()
            .prefix("paper-ingest-")
            .suffix(&format!(".{extension}"))
            .tempfile()
            .map_err(|e| IngestError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| IngestError::Internal(format!("tempfile write: {e}")))?;
        // `tmp` is deleted when it drops at the end of this call.
        self.ingest(tmp.path()).await
    }

    /// Run only the structural PDF checks.
    pub async fn validate(&self, path: impl AsRef<Path>) -> ValidationReport {
        validate_pdf(
            path.as_ref(),
            ValidationLimits {
                sample_bytes: self.config.validation_sample_bytes,
                max_file_size_bytes: self.config.max_file_size_bytes,
            },
        )
        .await
    }

    /// Count the pages of a PDF with the configured strategy.
    pub async fn count_pages(&self, path: impl AsRef<Path>) -> Result<PageCount, IngestError> {
        let path = path.as_ref();
        if self.config.page_count_strategy != PageCountStrategy::Heuristic {
            self.rasterizer.prepare().await?;
        }
        determine_page_count(
            self.rasterizer.as_ref(),
            path,
            self.config.page_count_strategy,
        )
        .await
        .map_err(|source| IngestError::PageCountFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Extract text without taking the upload slot or validating.
    pub async fn extract_text(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ExtractionOutput, IngestError> {
        let source = resolve_source(path.as_ref(), self.config.max_file_size_bytes).await?;
        self.extractor().extract(&source).await
    }

    /// Free the upload slot, e.g. after a downstream step failed. Harmless
    /// when the slot is not held.
    pub fn reset_processing_status(&self) {
        self.gate.release();
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_held()
    }

    fn extractor(&self) -> Extractor<'_> {
        Extractor::new(&self.config, self.rasterizer.as_ref(), self.engines.as_ref())
    }
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("config", &self.config)
            .field("busy", &self.gate.is_held())
            .finish()
    }
}

/// Blocking wrapper around [`DocumentPipeline::ingest`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn ingest_sync(
    pipeline: &DocumentPipeline,
    path: impl AsRef<Path>,
) -> Result<ExtractionOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(pipeline.ingest(path))
}
