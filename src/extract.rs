//! The OCR orchestrator: turn one resolved upload into text.
//!
//! ## Per-page state machine
//!
//! ```text
//!            ┌─────────── ok ───────────▶ Succeeded
//! render ────┤
//! (primary)  └─ err ─▶ render_preview ─┬─ ok ─▶ FellBackToPreview
//!                                      └─ err ─▶ Failed (error marker)
//! ```
//!
//! Every processed page contributes exactly one segment to the text, and no
//! page failure ever aborts the document. Pages are strictly sequential: a
//! tesseract process plus a rendered page is already the memory ceiling we
//! are willing to pay for, so batching only decides where the recovery pause
//! goes.

use crate::bounded::run_with_timeout;
use crate::config::IngestConfig;
use crate::error::{EngineError, IngestError, PageCountError, PageError};
use crate::output::{ExtractionOutput, PageOutcome, PageStatus};
use crate::pipeline::docx::extract_docx_text;
use crate::pipeline::input::{DocumentKind, SourceDocument};
use crate::pipeline::ocr::{EngineFactory, RecognitionEngine};
use crate::pipeline::page_count::determine_page_count;
use crate::pipeline::render::{PageImage, PageRasterizer};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Note placed before the text of a page that needed the preview render.
pub fn fallback_note(page_num: usize) -> String {
    format!("[Note: Using simplified rendering for page {page_num} due to complexity]\n")
}

/// Segment emitted for a page that produced no text at all.
pub fn error_marker(page_num: usize, reason: &str) -> String {
    format!("[Error: Unable to process page {page_num} - {reason}]\n\n")
}

/// Trailing note when the page cap cut the document short.
pub fn truncation_note(processed: usize, total: usize) -> String {
    format!(
        "\n[Note: Only the first {processed} pages were processed due to document size \
         (document has {total} pages)]\n"
    )
}

/// Drives extraction for one upload with the given collaborators.
pub struct Extractor<'a> {
    config: &'a IngestConfig,
    rasterizer: &'a dyn PageRasterizer,
    engines: &'a dyn EngineFactory,
}

impl<'a> Extractor<'a> {
    pub fn new(
        config: &'a IngestConfig,
        rasterizer: &'a dyn PageRasterizer,
        engines: &'a dyn EngineFactory,
    ) -> Self {
        Self {
            config,
            rasterizer,
            engines,
        }
    }

    /// Extract the text of `source`.
    ///
    /// # Errors
    /// Only fatal conditions: an unreadable Word file, an image the engine
    /// cannot read, an engine or rasteriser that will not start, or a page
    /// count that could not be established. Page-level failures end up in the text.
    pub async fn extract(&self, source: &SourceDocument) -> Result<ExtractionOutput, IngestError> {
        let span = info_span!(
            "extract",
            path = %source.path.display(),
            kind = %source.kind,
        );
        async {
            let started = Instant::now();
            let mut output = match source.kind {
                DocumentKind::Docx => self.extract_docx(&source.path).await?,
                DocumentKind::Image => self.extract_image(&source.path).await?,
                DocumentKind::Pdf => self.extract_pdf(&source.path).await?,
            };
            output.processing_time_ms = started.elapsed().as_millis() as u64;
            info!(
                "Extracted {} chars from {} of {} page(s) in {}ms",
                output.text.len(),
                output.pages_processed,
                output.page_count,
                output.processing_time_ms
            );
            Ok(output)
        }
        .instrument(span)
        .await
    }

    async fn extract_docx(&self, path: &Path) -> Result<ExtractionOutput, IngestError> {
        let text = extract_docx_text(path).await?;
        Ok(ExtractionOutput {
            text,
            document_kind: DocumentKind::Docx,
            page_count: 1,
            pages_processed: 1,
            processing_time_ms: 0,
            warnings: Vec::new(),
            pages: Vec::new(),
        })
    }

    async fn extract_image(&self, path: &Path) -> Result<ExtractionOutput, IngestError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IngestError::OcrFailed(format!("cannot read {}: {}", path.display(), e)))?;

        let mut engine = self.start_engine().await?;
        let result = run_with_timeout(
            "text recognition",
            self.config.recognition_timeout,
            engine.recognize(&bytes),
        )
        .await;
        engine.terminate().await;

        let text = match result {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(IngestError::OcrFailed(e.to_string())),
            Err(t) => return Err(IngestError::OcrFailed(t.to_string())),
        };

        Ok(ExtractionOutput {
            text,
            document_kind: DocumentKind::Image,
            page_count: 1,
            pages_processed: 1,
            processing_time_ms: 0,
            warnings: Vec::new(),
            pages: Vec::new(),
        })
    }

    async fn extract_pdf(&self, path: &Path) -> Result<ExtractionOutput, IngestError> {
        self.rasterizer.prepare().await?;
        let count = determine_page_count(self.rasterizer, path, self.config.page_count_strategy)
            .await
            .map_err(|e| match e {
                PageCountError::PasswordProtected => IngestError::PasswordProtected {
                    path: path.to_path_buf(),
                },
                source => IngestError::PageCountFailed {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        let mut warnings: Vec<String> = count.warning.into_iter().collect();
        let page_count = count.pages;
        let to_process = page_count.min(self.config.max_pages);
        info!(
            "Processing PDF with {} page(s) (limiting to {})",
            page_count, to_process
        );

        if let Some(cb) = &self.config.progress_callback {
            cb.on_extraction_start(to_process);
        }

        let mut engine = self.start_engine().await?;
        let (mut text, pages) = self.process_pages(engine.as_mut(), path, to_process).await;
        engine.terminate().await;

        if page_count > to_process {
            text.push_str(&truncation_note(to_process, page_count));
            warnings.push(format!(
                "Only the first {to_process} of {page_count} pages were processed."
            ));
        }

        let produced = pages
            .iter()
            .filter(|p| !matches!(p.status, PageStatus::Failed { .. }))
            .count();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_extraction_complete(to_process, produced);
        }

        Ok(ExtractionOutput {
            text,
            document_kind: DocumentKind::Pdf,
            page_count,
            pages_processed: pages.len(),
            processing_time_ms: 0,
            warnings,
            pages,
        })
    }

    async fn start_engine(&self) -> Result<Box<dyn RecognitionEngine>, IngestError> {
        self.engines.create().await.map_err(|e| match e {
            EngineError::Init(msg) | EngineError::Recognition(msg) => IngestError::EngineInit(msg),
        })
    }

    async fn process_pages(
        &self,
        engine: &mut dyn RecognitionEngine,
        path: &Path,
        to_process: usize,
    ) -> (String, Vec<PageOutcome>) {
        let batch_size = self.config.batch_size.max(1);
        let mut text = String::new();
        let mut outcomes = Vec::with_capacity(to_process);

        let pages: Vec<usize> = (1..=to_process).collect();
        let batches = pages.chunks(batch_size).count();
        for (batch_idx, batch) in pages.chunks(batch_size).enumerate() {
            debug!(
                "Processing batch {}: pages {}-{}",
                batch_idx + 1,
                batch[0],
                batch[batch.len() - 1]
            );
            for &page_num in batch {
                let (segment, outcome) = self.process_page(engine, path, page_num, to_process).await;
                text.push_str(&segment);
                outcomes.push(outcome);
            }
            if batch_idx + 1 < batches {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        (text, outcomes)
    }

    async fn process_page(
        &self,
        engine: &mut dyn RecognitionEngine,
        path: &Path,
        page_num: usize,
        total: usize,
    ) -> (String, PageOutcome) {
        let started = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }

        let (segment, status, chars) = match self.primary(engine, path, page_num).await {
            Ok(text) => {
                let chars = text.chars().count();
                (format!("{text}\n\n"), PageStatus::Succeeded, chars)
            }
            Err(primary) => {
                warn!("Page {} failed ({}); trying preview render", page_num, primary);
                if let Some(cb) = cb {
                    cb.on_page_fallback(page_num, total, &primary.to_string());
                }
                match self.fallback(engine, path, page_num).await {
                    Ok(text) => {
                        let chars = text.chars().count();
                        (
                            format!("{}{}\n\n", fallback_note(page_num), text),
                            PageStatus::FellBackToPreview { reason: primary },
                            chars,
                        )
                    }
                    Err(fallback) => {
                        warn!("Preview of page {} also failed: {}", page_num, fallback);
                        (
                            error_marker(page_num, &primary.to_string()),
                            PageStatus::Failed { reason: primary },
                            0,
                        )
                    }
                }
            }
        };

        if let Some(cb) = cb {
            match &status {
                PageStatus::Failed { reason } => cb.on_page_error(page_num, total, &reason.to_string()),
                _ => cb.on_page_complete(page_num, total, chars),
            }
        }

        let outcome = PageOutcome {
            page_num,
            status,
            chars,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        (segment, outcome)
    }

    /// Full render bounded by the page timeout, then recognition.
    async fn primary(
        &self,
        engine: &mut dyn RecognitionEngine,
        path: &Path,
        page_num: usize,
    ) -> Result<String, PageError> {
        let image = run_with_timeout(
            "page processing",
            self.config.page_timeout,
            self.rasterizer.render(path, page_num),
        )
        .await
        .map_err(|t| PageError::Timeout {
            page: page_num,
            operation: t.operation.to_string(),
            secs: t.after.as_secs(),
        })??;
        self.recognize(engine, &image, page_num).await
    }

    async fn fallback(
        &self,
        engine: &mut dyn RecognitionEngine,
        path: &Path,
        page_num: usize,
    ) -> Result<String, PageError> {
        let image = self.rasterizer.render_preview(path, page_num).await?;
        if image.placeholder {
            debug!("Page {} is a placeholder image", page_num);
        }
        self.recognize(engine, &image, page_num).await
    }

    async fn recognize(
        &self,
        engine: &mut dyn RecognitionEngine,
        image: &PageImage,
        page_num: usize,
    ) -> Result<String, PageError> {
        run_with_timeout(
            "text recognition",
            self.config.recognition_timeout,
            engine.recognize(&image.png),
        )
        .await
        .map_err(|t| PageError::Timeout {
            page: page_num,
            operation: t.operation.to_string(),
            secs: t.after.as_secs(),
        })?
        .map_err(|e| PageError::RecognitionFailed {
            page: page_num,
            detail: e.to_string(),
        })
    }
}
