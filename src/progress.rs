//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to be told as
//! the orchestrator works through a PDF. Hosts typically forward these to a
//! progress bar, a websocket or a job record; the library does not care.
//!
//! # Example
//!
//! ```rust
//! use paper_ingest::{ExtractionProgressCallback, IngestConfig};
//! use std::sync::Arc;
//!
//! /// Logs only the pages that needed the simplified render.
//! struct DegradedPages;
//!
//! impl ExtractionProgressCallback for DegradedPages {
//!     fn on_page_fallback(&self, page_num: usize, total_pages: usize, reason: &str) {
//!         eprintln!("page {page_num}/{total_pages} degraded: {reason}");
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(DegradedPages))
//!     .build()
//!     .expect("default timeouts are valid");
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// Pages are processed one at a time, so calls never overlap for a single
/// extraction; implementations still need `Send + Sync` because the pipeline
/// may be shared across tasks. Every method defaults to a no-op.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page count is known, before the first page.
    ///
    /// # Arguments
    /// * `total_pages`: pages that will be processed (after the page cap)
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the full-fidelity render of a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced text, on either path.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `text_len`: characters recognised on the page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when the full render failed and the preview is about to be tried.
    fn on_page_fallback(&self, page_num: usize, total_pages: usize, reason: &str) {
        let _ = (page_num, total_pages, reason);
    }

    /// Called when both paths failed for a page.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    ///
    /// # Arguments
    /// * `success_count`: pages that produced text (including fallbacks)
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
