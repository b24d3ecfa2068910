//! Integration tests for the ingestion pipeline.
//!
//! pdfium and tesseract are replaced by scripted fakes so these run
//! anywhere: the rasteriser "renders" a page to the bytes `page-N`, and the
//! engine "recognises" any image as `TEXT[<bytes>]`. Timeouts run on a
//! paused clock.

use async_trait::async_trait;
use paper_ingest::{
    ingest_sync, DocumentKind, DocumentPipeline, EngineError, EngineFactory,
    ExtractionProgressCallback, IngestConfig, IngestError, NoopGate, PageCountError,
    PageCountStrategy, PageError, PageImage, PageRasterizer, PageStatus, ProcessingGate,
    RecognitionEngine, UploadGate,
};
use serial_test::serial;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedRasterizer {
    pages: usize,
    count_error: Option<PageCountError>,
    fail_primary: HashSet<usize>,
    hang_primary: HashSet<usize>,
    fail_preview: HashSet<usize>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRasterizer {
    fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn image(page_num: usize, label: &str) -> PageImage {
        PageImage {
            page_num,
            png: format!("{label}-{page_num}").into_bytes(),
            width: 10,
            height: 10,
            placeholder: false,
        }
    }
}

#[async_trait]
impl PageRasterizer for ScriptedRasterizer {
    async fn page_count(&self, _path: &Path) -> Result<usize, PageCountError> {
        match &self.count_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.pages),
        }
    }

    async fn render(&self, _path: &Path, page_num: usize) -> Result<PageImage, PageError> {
        self.calls.lock().unwrap().push(format!("render {page_num}"));
        if self.hang_primary.contains(&page_num) {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        if self.fail_primary.contains(&page_num) {
            return Err(PageError::Rendering { page: page_num });
        }
        Ok(Self::image(page_num, "page"))
    }

    async fn render_preview(&self, _path: &Path, page_num: usize) -> Result<PageImage, PageError> {
        self.calls.lock().unwrap().push(format!("preview {page_num}"));
        if self.fail_preview.contains(&page_num) {
            return Err(PageError::ConversionFailed {
                page: page_num,
                detail: "preview exploded".into(),
            });
        }
        Ok(Self::image(page_num, "preview"))
    }
}

#[derive(Default)]
struct ScriptedEngines {
    fail_init: bool,
    /// Image bytes the engine refuses.
    reject: HashSet<Vec<u8>>,
    /// Image bytes the engine never finishes.
    hang: HashSet<Vec<u8>>,
    created: AtomicUsize,
    terminated: Arc<AtomicUsize>,
}

struct ScriptedEngine {
    reject: HashSet<Vec<u8>>,
    hang: HashSet<Vec<u8>>,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn recognize(&mut self, image: &[u8]) -> Result<String, EngineError> {
        if self.hang.contains(image) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.reject.contains(image) {
            return Err(EngineError::Recognition("unreadable image".into()));
        }
        Ok(format!("TEXT[{}]", String::from_utf8_lossy(image)))
    }

    async fn terminate(&mut self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngines {
    async fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        if self.fail_init {
            return Err(EngineError::Init("tesseract: not found".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            reject: self.reject.clone(),
            hang: self.hang.clone(),
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n%%EOF\n";

fn fixture(bytes: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

fn pipeline(
    config: IngestConfig,
    rasterizer: Arc<ScriptedRasterizer>,
    engines: Arc<ScriptedEngines>,
) -> DocumentPipeline {
    DocumentPipeline::with_components(config, rasterizer, engines, Arc::new(NoopGate))
}

fn default_pipeline(
    rasterizer: Arc<ScriptedRasterizer>,
    engines: Arc<ScriptedEngines>,
) -> DocumentPipeline {
    pipeline(IngestConfig::default(), rasterizer, engines)
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file("[Content_Types].xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_text_is_engine_output_without_markers() {
    let engines = Arc::new(ScriptedEngines::default());
    let p = default_pipeline(Arc::new(ScriptedRasterizer::default()), engines.clone());
    let img = fixture(b"fake-jpeg", ".jpg");

    let out = p.ingest(img.path()).await.unwrap();

    assert_eq!(out.text, "TEXT[fake-jpeg]");
    assert_eq!(out.document_kind, DocumentKind::Image);
    assert_eq!(out.page_count, 1);
    assert!(out.pages.is_empty());
    assert_eq!(engines.created.load(Ordering::SeqCst), 1);
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn image_recognition_failure_is_fatal_and_engine_terminated() {
    let engines = Arc::new(ScriptedEngines {
        reject: [b"blurry".to_vec()].into_iter().collect(),
        ..Default::default()
    });
    let p = default_pipeline(Arc::new(ScriptedRasterizer::default()), engines.clone());
    let img = fixture(b"blurry", ".png");

    let err = p.ingest(img.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::OcrFailed(_)), "got {err:?}");
    assert_eq!(err.suggested_status(), 500);
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 1);
}

// ── PDFs ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn small_pdf_has_one_segment_per_page() {
    let raster = Arc::new(ScriptedRasterizer::with_pages(3));
    let engines = Arc::new(ScriptedEngines::default());
    let p = default_pipeline(raster.clone(), engines.clone());
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    assert_eq!(
        out.text,
        "TEXT[page-1]\n\nTEXT[page-2]\n\nTEXT[page-3]\n\n"
    );
    assert_eq!(out.page_count, 3);
    assert_eq!(out.pages_processed, 3);
    assert!(out.pages.iter().all(|p| p.status.is_success()));
    assert!(!out.is_truncated());
    assert_eq!(
        raster.calls(),
        vec!["render 1", "render 2", "render 3"]
    );
    assert_eq!(engines.created.load(Ordering::SeqCst), 1);
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn twelve_pages_with_page_seven_falling_back() {
    let raster = Arc::new(ScriptedRasterizer {
        pages: 12,
        fail_primary: [7].into_iter().collect(),
        ..Default::default()
    });
    let engines = Arc::new(ScriptedEngines::default());
    let p = default_pipeline(raster.clone(), engines.clone());
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    let mut expected = String::new();
    for n in 1..=8 {
        if n == 7 {
            expected.push_str(
                "[Note: Using simplified rendering for page 7 due to complexity]\nTEXT[preview-7]\n\n",
            );
        } else {
            expected.push_str(&format!("TEXT[page-{n}]\n\n"));
        }
    }
    expected.push_str(
        "\n[Note: Only the first 8 pages were processed due to document size (document has 12 pages)]\n",
    );
    assert_eq!(out.text, expected);

    assert_eq!(out.page_count, 12);
    assert_eq!(out.pages_processed, 8);
    assert!(out.is_truncated());
    let nums: Vec<usize> = out.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(nums, (1..=8).collect::<Vec<_>>());
    assert_eq!(
        out.pages[6].status,
        PageStatus::FellBackToPreview {
            reason: PageError::Rendering { page: 7 }
        }
    );
    assert_eq!(out.fallback_pages().count(), 1);
    assert!(out.warnings.iter().any(|w| w.contains("8 of 12")));

    let calls = raster.calls();
    assert!(!calls.iter().any(|c| c == "render 9"));
    assert!(calls.contains(&"preview 7".to_string()));
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_page_gets_error_marker_and_processing_continues() {
    let raster = Arc::new(ScriptedRasterizer {
        pages: 3,
        fail_primary: [2].into_iter().collect(),
        fail_preview: [2].into_iter().collect(),
        ..Default::default()
    });
    let p = default_pipeline(raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    let segments: Vec<&str> = out.text.split_terminator("\n\n").collect();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0], "TEXT[page-1]");
    assert!(
        segments[1].starts_with("[Error: Unable to process page 2 - Canvas rendering error on page 2"),
        "got {:?}",
        segments[1]
    );
    assert_eq!(segments[2], "TEXT[page-3]");
    assert!(matches!(out.pages[1].status, PageStatus::Failed { .. }));
    assert_eq!(out.pages[1].chars, 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_render_times_out_into_preview() {
    let raster = Arc::new(ScriptedRasterizer {
        pages: 2,
        hang_primary: [1].into_iter().collect(),
        ..Default::default()
    });
    let p = default_pipeline(raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    match &out.pages[0].status {
        PageStatus::FellBackToPreview {
            reason: PageError::Timeout { page, secs, .. },
        } => {
            assert_eq!(*page, 1);
            assert_eq!(*secs, 25);
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(out.text.starts_with("[Note: Using simplified rendering for page 1"));
    assert!(out.text.contains("TEXT[page-2]"));
}

#[tokio::test(start_paused = true)]
async fn hanging_recognition_times_out_per_page() {
    let engines = Arc::new(ScriptedEngines {
        hang: [b"page-1".to_vec()].into_iter().collect(),
        ..Default::default()
    });
    let raster = Arc::new(ScriptedRasterizer::with_pages(1));
    let p = default_pipeline(raster, engines.clone());
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    assert!(matches!(
        out.pages[0].status,
        PageStatus::FellBackToPreview {
            reason: PageError::Timeout { .. }
        }
    ));
    assert!(out.text.contains("TEXT[preview-1]"));
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn batches_pause_between_but_not_after_last() {
    let raster = Arc::new(ScriptedRasterizer::with_pages(5));
    let config = IngestConfig::builder()
        .batch_pause(Duration::from_secs(10))
        .build()
        .unwrap();
    let p = pipeline(config, raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let started = tokio::time::Instant::now();
    let out = p.ingest(pdf.path()).await.unwrap();

    // 5 pages in batches of 2 → 3 batches → 2 pauses.
    assert_eq!(out.pages_processed, 5);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(30), "{elapsed:?}");
}

#[tokio::test]
async fn engine_init_failure_is_fatal() {
    let engines = Arc::new(ScriptedEngines {
        fail_init: true,
        ..Default::default()
    });
    let p = default_pipeline(Arc::new(ScriptedRasterizer::with_pages(2)), engines.clone());
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let err = p.ingest(pdf.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::EngineInit(_)));
    assert!(err.to_string().contains("tesseract: not found"));
    assert_eq!(engines.terminated.load(Ordering::SeqCst), 0);
}

// ── Page counting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn password_protected_pdf_is_rejected() {
    let raster = Arc::new(ScriptedRasterizer {
        count_error: Some(PageCountError::PasswordProtected),
        ..Default::default()
    });
    let engines = Arc::new(ScriptedEngines::default());
    let p = default_pipeline(raster, engines.clone());
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let err = p.ingest(pdf.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::PasswordProtected { .. }));
    assert_eq!(err.suggested_status(), 400);
    // Page counting happens before the engine is started.
    assert_eq!(engines.created.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn parser_failure_falls_back_to_byte_scan() {
    let raster = Arc::new(ScriptedRasterizer {
        count_error: Some(PageCountError::Failed {
            detail: "FormatError".into(),
        }),
        ..Default::default()
    });
    let p = default_pipeline(raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(
        b"%PDF-1.4\n3 0 obj << /Type /Page >>\n4 0 obj << /Type /Page >>\n",
        ".pdf",
    );

    let out = p.ingest(pdf.path()).await.unwrap();

    assert_eq!(out.page_count, 2);
    assert_eq!(out.pages_processed, 2);
    assert!(out.warnings.iter().any(|w| w.contains("estimated as 2")));
}

#[tokio::test]
async fn authoritative_strategy_does_not_fall_back() {
    let raster = Arc::new(ScriptedRasterizer {
        count_error: Some(PageCountError::Timeout { secs: 15 }),
        ..Default::default()
    });
    let config = IngestConfig::builder()
        .page_count_strategy(PageCountStrategy::Authoritative)
        .build()
        .unwrap();
    let p = pipeline(config, raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let err = p.ingest(pdf.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::PageCountFailed { .. }));
    assert_eq!(err.suggested_status(), 408);
}

#[tokio::test]
async fn count_pages_reports_estimate_flag() {
    let config = IngestConfig::builder()
        .page_count_strategy(PageCountStrategy::Heuristic)
        .build()
        .unwrap();
    let p = pipeline(
        config,
        Arc::new(ScriptedRasterizer::with_pages(40)),
        Arc::new(ScriptedEngines::default()),
    );
    let pdf = fixture(b"%PDF-1.4\n/Type /Page\n", ".pdf");

    let count = p.count_pages(pdf.path()).await.unwrap();
    assert_eq!(count.pages, 1);
    assert!(count.estimated);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_pdf_is_rejected_with_report() {
    let engines = Arc::new(ScriptedEngines::default());
    let gate = Arc::new(ProcessingGate::new());
    let p = default_pipeline(Arc::new(ScriptedRasterizer::with_pages(1)), engines.clone())
        .with_gate(gate.clone());
    let not_pdf = fixture(b"PK\x03\x04 this is a zip", ".pdf");

    let err = p.ingest(not_pdf.path()).await.unwrap_err();

    let report = err.validation_report().expect("report attached");
    assert!(!report.is_valid);
    assert_eq!(report.issues.len(), 1);
    assert!(err.to_string().contains("proper PDF header"));
    assert_eq!(err.suggested_status(), 400);
    assert_eq!(engines.created.load(Ordering::SeqCst), 0);
    assert!(!gate.is_held(), "gate must be released on rejection");
}

#[tokio::test(start_paused = true)]
async fn validation_warnings_are_carried_into_output() {
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::with_pages(1)),
        Arc::new(ScriptedEngines::default()),
    );
    let pdf = fixture(b"%PDF-1.7\n/XObject << >>\n/U3D\n", ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();

    assert!(out.warnings.iter().any(|w| w.contains("3D content")));
    assert!(out.warnings.iter().any(|w| w.contains("complex graphics")));
    assert_eq!(out.text, "TEXT[page-1]\n\n");
}

#[tokio::test]
async fn oversize_upload_is_rejected_before_validation() {
    let config = IngestConfig::builder()
        .max_file_size_bytes(16)
        .build()
        .unwrap();
    let p = pipeline(
        config,
        Arc::new(ScriptedRasterizer::with_pages(1)),
        Arc::new(ScriptedEngines::default()),
    );
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let err = p.ingest(pdf.path()).await.unwrap_err();
    assert!(matches!(err, IngestError::FileTooLarge { .. }));

    // The early rejection reads the same as the validator's size issue and
    // carries the same advice.
    let report = p.validate(pdf.path()).await;
    let message = err.to_string();
    let mut lines = message.lines();
    assert_eq!(lines.next(), report.errors().next().map(|i| i.message.as_str()));
    assert_eq!(lines.next(), report.recommendations.first().map(String::as_str));
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn docx_bypasses_engine_and_rasteriser() {
    let raster = Arc::new(ScriptedRasterizer::with_pages(5));
    let engines = Arc::new(ScriptedEngines::default());
    let p = default_pipeline(raster.clone(), engines.clone());

    let out = p
        .ingest_bytes(&docx_bytes(&["Section A", "Question 1"]), "docx")
        .await
        .unwrap();

    assert_eq!(out.text, "Section A\n\nQuestion 1\n\n");
    assert_eq!(out.document_kind, DocumentKind::Docx);
    assert_eq!(engines.created.load(Ordering::SeqCst), 0);
    assert!(raster.calls().is_empty());
}

/// Default pipeline pointed at a pdfium library that does not exist.
fn pipeline_without_pdfium() -> DocumentPipeline {
    let config = IngestConfig::builder()
        .pdfium_library("/nonexistent/pdfium/libpdfium.so")
        .build()
        .unwrap();
    DocumentPipeline::new(config).with_gate(Arc::new(NoopGate))
}

#[tokio::test]
async fn docx_and_validation_work_without_pdfium() {
    let p = pipeline_without_pdfium();

    let out = p
        .ingest_bytes(&docx_bytes(&["Paper 1", "Answer all questions."]), "docx")
        .await
        .unwrap();
    assert_eq!(out.text, "Paper 1\n\nAnswer all questions.\n\n");

    let pdf = fixture(MINIMAL_PDF, ".pdf");
    assert!(p.validate(pdf.path()).await.is_valid);
}

#[tokio::test]
async fn pdf_without_pdfium_is_fatal() {
    let p = pipeline_without_pdfium();
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let err = p.ingest(pdf.path()).await.unwrap_err();
    assert!(matches!(err, IngestError::PdfiumBindingFailed(_)), "got {err:?}");
    assert_eq!(err.suggested_status(), 500);

    let err = p.count_pages(pdf.path()).await.unwrap_err();
    assert!(matches!(err, IngestError::PdfiumBindingFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn corrupt_docx_is_fatal() {
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::default()),
        Arc::new(ScriptedEngines::default()),
    );
    let err = p.ingest_bytes(b"definitely not a zip", ".docx").await.unwrap_err();
    assert!(matches!(err, IngestError::DocxFailed(_)));
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::default()),
        Arc::new(ScriptedEngines::default()),
    );
    let err = p.ingest_bytes(b"#!/bin/sh", "sh").await.unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    assert_eq!(err.suggested_status(), 400);
}

#[tokio::test]
async fn ingest_bytes_cleans_up_and_leaves_no_file() {
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::default()),
        Arc::new(ScriptedEngines::default()),
    );
    let out = p.ingest_bytes(b"scan", "PNG").await.unwrap();
    assert_eq!(out.text, "TEXT[scan]");
}

// ── Gate ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn busy_pipeline_rejects_second_upload() {
    let gate = Arc::new(ProcessingGate::new());
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::default()),
        Arc::new(ScriptedEngines::default()),
    )
    .with_gate(gate.clone());
    let img = fixture(b"img", ".png");

    assert!(gate.try_acquire("someone-else"));
    let err = p.ingest(img.path()).await.unwrap_err();
    assert!(matches!(err, IngestError::Busy));
    assert_eq!(err.suggested_status(), 429);
    assert!(p.is_busy());

    p.reset_processing_status();
    p.reset_processing_status();
    assert!(!p.is_busy());

    p.ingest(img.path()).await.unwrap();
    assert!(!gate.is_held(), "slot released after success");
}

#[tokio::test]
#[serial]
async fn global_gate_is_shared_between_pipelines() {
    let make = || {
        DocumentPipeline::with_components(
            IngestConfig::default(),
            Arc::new(ScriptedRasterizer::default()),
            Arc::new(ScriptedEngines::default()),
            ProcessingGate::global(),
        )
    };
    let (a, b) = (make(), make());
    let img = fixture(b"img", ".gif");

    ProcessingGate::global().release();
    assert!(ProcessingGate::global().try_acquire("held-by-a"));
    assert!(a.is_busy());
    assert!(matches!(
        b.ingest(img.path()).await.unwrap_err(),
        IngestError::Busy
    ));

    a.reset_processing_status();
    assert!(b.ingest(img.path()).await.is_ok());
    assert!(!ProcessingGate::global().is_held());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }
    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.events.lock().unwrap().push(format!("page {page_num}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, _len: usize) {
        self.events.lock().unwrap().push(format!("done {page_num}"));
    }
    fn on_page_fallback(&self, page_num: usize, _total: usize, _reason: &str) {
        self.events.lock().unwrap().push(format!("fallback {page_num}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {page_num}"));
    }
    fn on_extraction_complete(&self, total: usize, success: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {success}/{total}"));
    }
}

#[tokio::test(start_paused = true)]
async fn progress_events_follow_page_outcomes() {
    let cb = Arc::new(RecordingCallback::default());
    let config = IngestConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let raster = Arc::new(ScriptedRasterizer {
        pages: 3,
        fail_primary: [2, 3].into_iter().collect(),
        fail_preview: [3].into_iter().collect(),
        ..Default::default()
    });
    let p = pipeline(config, raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    p.ingest(pdf.path()).await.unwrap();

    let events = cb.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 3",
            "page 1",
            "done 1",
            "page 2",
            "fallback 2",
            "done 2",
            "page 3",
            "fallback 3",
            "error 3",
            "complete 2/3",
        ]
    );
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn output_is_json_serialisable() {
    let raster = Arc::new(ScriptedRasterizer {
        pages: 2,
        fail_primary: [2].into_iter().collect(),
        ..Default::default()
    });
    let p = default_pipeline(raster, Arc::new(ScriptedEngines::default()));
    let pdf = fixture(MINIMAL_PDF, ".pdf");

    let out = p.ingest(pdf.path()).await.unwrap();
    let json = serde_json::to_value(&out).unwrap();

    assert_eq!(json["document_kind"], "pdf");
    assert_eq!(json["pages"][0]["status"], "succeeded");
    assert_eq!(json["pages"][1]["status"], "fell_back_to_preview");
}

// ── Blocking API ─────────────────────────────────────────────────────────────

#[test]
fn ingest_sync_works_outside_a_runtime() {
    let p = default_pipeline(
        Arc::new(ScriptedRasterizer::default()),
        Arc::new(ScriptedEngines::default()),
    );
    let img = fixture(b"tiff-bytes", ".tiff");
    let out = ingest_sync(&p, img.path()).unwrap();
    assert_eq!(out.text, "TEXT[tiff-bytes]");
}
