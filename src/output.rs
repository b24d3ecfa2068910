//! Result types returned by the ingestion pipeline.

use crate::error::PageError;
use crate::pipeline::input::DocumentKind;
use serde::{Deserialize, Serialize};

/// What happened to one processed PDF page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    /// Full-fidelity render and recognition both succeeded.
    Succeeded,
    /// The full render or its recognition failed; the preview was used.
    FellBackToPreview { reason: PageError },
    /// Neither path produced text; the page contributes an error marker.
    Failed { reason: PageError },
}

impl PageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PageStatus::Succeeded)
    }

    pub fn reason(&self) -> Option<&PageError> {
        match self {
            PageStatus::Succeeded => None,
            PageStatus::FellBackToPreview { reason } | PageStatus::Failed { reason } => {
                Some(reason)
            }
        }
    }
}

/// Per-page record kept alongside the stitched text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    #[serde(flatten)]
    pub status: PageStatus,
    /// Characters of recognised text (markers excluded).
    pub chars: usize,
    pub duration_ms: u64,
}

/// Everything the pipeline produces for one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Page contributions in ascending page order, separated by blank lines.
    pub text: String,
    pub document_kind: DocumentKind,
    /// Pages in the document (1 for images and Word files).
    pub page_count: usize,
    /// Pages actually OCR'd; never more than `page_count` or the page cap.
    pub pages_processed: usize,
    pub processing_time_ms: u64,
    /// Non-fatal notes: validator warnings, estimated page counts, truncation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// One entry per processed PDF page; empty for other kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageOutcome>,
}

impl ExtractionOutput {
    /// Pages that fell back to the preview render.
    pub fn fallback_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::FellBackToPreview { .. }))
    }

    /// Pages that contributed only an error marker.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Failed { .. }))
    }

    /// `true` when more pages exist than were processed.
    pub fn is_truncated(&self) -> bool {
        self.page_count > self.pages_processed && self.document_kind == DocumentKind::Pdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(page_num: usize, status: PageStatus) -> PageOutcome {
        PageOutcome {
            page_num,
            status,
            chars: 10,
            duration_ms: 5,
        }
    }

    #[test]
    fn status_serialises_with_tag() {
        let json = serde_json::to_value(outcome(
            7,
            PageStatus::FellBackToPreview {
                reason: PageError::Rendering { page: 7 },
            },
        ))
        .unwrap();
        assert_eq!(json["page_num"], 7);
        assert_eq!(json["status"], "fell_back_to_preview");
        assert!(json["reason"].is_object());

        let json = serde_json::to_value(outcome(1, PageStatus::Succeeded)).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn counts_by_status() {
        let out = ExtractionOutput {
            text: String::new(),
            document_kind: DocumentKind::Pdf,
            page_count: 12,
            pages_processed: 3,
            processing_time_ms: 0,
            warnings: vec![],
            pages: vec![
                outcome(1, PageStatus::Succeeded),
                outcome(
                    2,
                    PageStatus::FellBackToPreview {
                        reason: PageError::Rendering { page: 2 },
                    },
                ),
                outcome(
                    3,
                    PageStatus::Failed {
                        reason: PageError::Rendering { page: 3 },
                    },
                ),
            ],
        };
        assert_eq!(out.fallback_pages().count(), 1);
        assert_eq!(out.failed_pages().count(), 1);
        assert!(out.is_truncated());
        assert!(out.pages[0].status.is_success());
        assert!(out.pages[0].status.reason().is_none());
    }

    #[test]
    fn empty_lists_are_omitted() {
        let out = ExtractionOutput {
            text: "hello".into(),
            document_kind: DocumentKind::Image,
            page_count: 1,
            pages_processed: 1,
            processing_time_ms: 3,
            warnings: vec![],
            pages: vec![],
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["document_kind"], "image");
        assert!(json.get("warnings").is_none());
        assert!(json.get("pages").is_none());
    }
}
