//! Error types for the paper-ingest library.
//!
//! Two distinct error families reflect two distinct failure modes:
//!
//! * [`IngestError`]: **Fatal**: the upload cannot be ingested at all
//!   (missing file, unsupported format, structurally invalid PDF, OCR engine
//!   unavailable, another upload in flight). Returned as `Err(IngestError)`
//!   from the [`crate::DocumentPipeline`] entry points.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed to rasterise or be
//!   recognised. It never leaves the orchestrator as an `Err`; it is turned
//!   into a fallback attempt and, failing that, an in-text error marker so
//!   the rest of the document still comes through.
//!
//! [`PageCountError`] and [`EngineError`] are the narrower errors of the page
//! counter and the recognition engine; the orchestrator decides which of them
//! become fatal.

use crate::pipeline::validate::ValidationReport;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a fatal error.
///
/// The HTTP mapping itself belongs to the route handler; this only carries
/// the suggestion so the handler does not have to parse messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed, unsupported or oversized input. Never retried.
    InputRejected,
    /// A bounded operation ran out of time.
    Timeout,
    /// Another upload holds the processing slot.
    Busy,
    /// Unclassified pipeline failure.
    Fatal,
}

impl ErrorClass {
    /// Suggested HTTP status code for this class.
    pub fn suggested_status(self) -> u16 {
        match self {
            ErrorClass::InputRejected => 400,
            ErrorClass::Timeout => 408,
            ErrorClass::Busy => 429,
            ErrorClass::Fatal => 500,
        }
    }
}

/// All fatal errors returned by the paper-ingest library.
///
/// Page-level failures use [`PageError`] and end up as markers inside the
/// extracted text rather than propagated here.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Upload not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of the accepted document types.
    #[error("Invalid file type '.{extension}'. Only PDF documents, DOCX files and images are allowed.")]
    UnsupportedFormat { extension: String },

    /// The upload exceeds the configured size ceiling.
    #[error(
        "File is too large ({size_mb} MB). Maximum allowed size is {max_mb} MB.\n{advice}",
        advice = crate::pipeline::validate::SIZE_RECOMMENDATION
    )]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Structural validation rejected the PDF.
    #[error("Invalid PDF file. {message}")]
    InvalidPdf {
        message: String,
        report: ValidationReport,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document is password-protected.
    #[error("Password-protected PDF detected. Please remove the password and try again.")]
    PasswordProtected { path: PathBuf },

    /// The page count could not be determined by any configured strategy.
    #[error("Unable to determine the page count of '{path}': {source}")]
    PageCountFailed {
        path: PathBuf,
        #[source]
        source: PageCountError,
    },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The OCR engine could not be started.
    #[error(
        "Failed to initialise the OCR engine: {0}\n\
Make sure tesseract is installed and on PATH, or pass --tesseract /path/to/tesseract."
    )]
    EngineInit(String),

    /// OCR of a single-image upload failed.
    #[error("OCR processing failed: {0}")]
    OcrFailed(String),

    /// Raw-text extraction from a DOCX file failed.
    #[error("DOCX processing failed: {0}")]
    DocxFailed(String),

    // ── Concurrency ───────────────────────────────────────────────────────
    /// Another upload currently holds the processing slot.
    #[error("Another upload is currently being processed. Please try again in a moment.")]
    Busy,

    // ── Environment ───────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Classify this error for the caller.
    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::FileNotFound { .. }
            | IngestError::PermissionDenied { .. }
            | IngestError::UnsupportedFormat { .. }
            | IngestError::FileTooLarge { .. }
            | IngestError::InvalidPdf { .. }
            | IngestError::PasswordProtected { .. }
            | IngestError::InvalidConfig(_) => ErrorClass::InputRejected,
            IngestError::PageCountFailed { source, .. } => match source {
                PageCountError::Timeout { .. } => ErrorClass::Timeout,
                PageCountError::PasswordProtected => ErrorClass::InputRejected,
                PageCountError::Failed { .. } => ErrorClass::Fatal,
            },
            IngestError::Busy => ErrorClass::Busy,
            IngestError::EngineInit(_)
            | IngestError::OcrFailed(_)
            | IngestError::DocxFailed(_)
            | IngestError::PdfiumBindingFailed(_)
            | IngestError::Internal(_) => ErrorClass::Fatal,
        }
    }

    /// Shorthand for `self.class().suggested_status()`.
    pub fn suggested_status(&self) -> u16 {
        self.class().suggested_status()
    }

    /// The validation report attached to an [`IngestError::InvalidPdf`].
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            IngestError::InvalidPdf { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Failure of the authoritative page counter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageCountError {
    /// The parser reported a password requirement.
    #[error("Password-protected PDF detected. Please remove the password and try again.")]
    PasswordProtected,

    /// Loading the document exceeded its bound.
    #[error("PDF processing timed out after {secs}s. The file may be too large or complex.")]
    Timeout { secs: u64 },

    /// Any other parser failure.
    #[error("Failed to process PDF: {detail}")]
    Failed { detail: String },
}

impl PageCountError {
    /// Classify a raw parser error message.
    pub fn from_parser_message(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if detail.to_lowercase().contains("password") {
            PageCountError::PasswordProtected
        } else {
            PageCountError::Failed { detail }
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored as the reason of a fallback or failed [`crate::output::PageStatus`].
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The renderer choked on page content.
    #[error(
        "Canvas rendering error on page {page}: The PDF contains elements that cannot be rendered. \
Try converting the PDF to a different format."
    )]
    Rendering { page: usize },

    /// A bounded step for this page ran out of time.
    #[error(
        "Timeout while processing page {page}: {operation} timed out after {secs}s. \
The page is too complex or contains too many elements."
    )]
    Timeout {
        page: usize,
        operation: String,
        secs: u64,
    },

    /// Any other rasterisation failure.
    #[error("Failed to convert PDF page {page} to image: {detail}")]
    ConversionFailed { page: usize, detail: String },

    /// The engine returned an error for this page's image.
    #[error("Text recognition failed on page {page}: {detail}")]
    RecognitionFailed { page: usize, detail: String },
}

impl PageError {
    /// Wrap a raw rasteriser message, re-labelling rendering failures.
    pub fn classify(page: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lowered = detail.to_lowercase();
        if lowered.contains("canvas") || lowered.contains("render") || lowered.contains("bitmap") {
            PageError::Rendering { page }
        } else {
            PageError::ConversionFailed { page, detail }
        }
    }

    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Rendering { page }
            | PageError::Timeout { page, .. }
            | PageError::ConversionFailed { page, .. }
            | PageError::RecognitionFailed { page, .. } => *page,
        }
    }
}

/// Errors raised by a recognition engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be started.
    #[error("engine initialisation failed: {0}")]
    Init(String),

    /// Recognition of one image failed.
    #[error("recognition failed: {0}")]
    Recognition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_display_and_class() {
        let e = IngestError::Busy;
        assert!(e.to_string().contains("Another upload"));
        assert_eq!(e.class(), ErrorClass::Busy);
        assert_eq!(e.suggested_status(), 429);
    }

    #[test]
    fn input_rejections_map_to_400() {
        let e = IngestError::UnsupportedFormat {
            extension: "exe".into(),
        };
        assert_eq!(e.suggested_status(), 400);
        assert!(e.to_string().contains(".exe"));

        let e = IngestError::FileTooLarge {
            path: PathBuf::from("big.pdf"),
            size_mb: 120,
            max_mb: 100,
        };
        assert_eq!(e.suggested_status(), 400);
        assert!(e.to_string().contains("120 MB"));
        assert!(e.to_string().contains("split the document"));
    }

    #[test]
    fn page_count_timeout_maps_to_408() {
        let e = IngestError::PageCountFailed {
            path: PathBuf::from("slow.pdf"),
            source: PageCountError::Timeout { secs: 15 },
        };
        assert_eq!(e.class(), ErrorClass::Timeout);
        assert_eq!(e.suggested_status(), 408);
    }

    #[test]
    fn unreadable_page_tree_maps_to_500() {
        let e = IngestError::PageCountFailed {
            path: PathBuf::from("mangled.pdf"),
            source: PageCountError::Failed {
                detail: "FormatError".into(),
            },
        };
        assert_eq!(e.class(), ErrorClass::Fatal);
        assert_eq!(e.suggested_status(), 500);

        let locked = IngestError::PageCountFailed {
            path: PathBuf::from("locked.pdf"),
            source: PageCountError::PasswordProtected,
        };
        assert_eq!(locked.suggested_status(), 400);
    }

    #[test]
    fn engine_init_maps_to_500() {
        let e = IngestError::EngineInit("tesseract: not found".into());
        assert_eq!(e.suggested_status(), 500);
        assert!(e.to_string().contains("tesseract: not found"));
    }

    #[test]
    fn parser_message_classification() {
        assert_eq!(
            PageCountError::from_parser_message("PdfiumLibraryInternalError(PasswordError)"),
            PageCountError::PasswordProtected
        );
        assert!(matches!(
            PageCountError::from_parser_message("FormatError"),
            PageCountError::Failed { .. }
        ));
    }

    #[test]
    fn page_error_relabels_render_failures() {
        assert_eq!(
            PageError::classify(3, "FPDF_RenderPageBitmap failed"),
            PageError::Rendering { page: 3 }
        );
        let other = PageError::classify(4, "PageIndexOutOfBounds");
        assert_eq!(other.page(), 4);
        assert!(other
            .to_string()
            .starts_with("Failed to convert PDF page 4 to image"));
    }

    #[test]
    fn timeout_message_names_page_and_operation() {
        let e = PageError::Timeout {
            page: 2,
            operation: "page rendering".into(),
            secs: 20,
        };
        let msg = e.to_string();
        assert!(msg.contains("page 2"), "got: {msg}");
        assert!(msg.contains("20s"), "got: {msg}");
    }
}
