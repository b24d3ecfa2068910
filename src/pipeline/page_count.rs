//! Page counting for PDF uploads.
//!
//! The authoritative count comes from pdfium's page tree (see
//! [`crate::pipeline::render::PageRasterizer::page_count`]). When pdfium
//! cannot open the document we fall back to a byte scan for page objects,
//! which is rough but never fails.

use crate::config::PageCountStrategy;
use crate::error::PageCountError;
use crate::pipeline::render::PageRasterizer;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::Path;
use tracing::{debug, warn};

static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Type\s*/Page").expect("valid page marker regex"));
static OBJECT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s+\d+\s+obj").expect("valid object marker regex"));

/// Objects per page assumed when only object headers are found.
const OBJECTS_PER_PAGE: usize = 10;
/// Fewer object headers than this are not worth extrapolating from.
const MIN_OBJECTS_FOR_ESTIMATE: usize = 5;

/// How a page count was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCount {
    pub pages: usize,
    /// `true` when the count came from the byte scan.
    pub estimated: bool,
    /// Set when the authoritative counter failed and the scan was used.
    pub warning: Option<String>,
}

/// Rough page count from the raw bytes of `path`.
///
/// Counts `/Type /Page` markers (this includes `/Pages` tree nodes, so it
/// can overshoot). Without any, extrapolates from indirect object headers.
/// Unreadable files count as a single page.
pub async fn estimate_page_count(path: &Path) -> usize {
    match tokio::fs::read(path).await {
        Ok(bytes) => estimate_from_bytes(&bytes),
        Err(e) => {
            warn!("Page estimate could not read {}: {}", path.display(), e);
            1
        }
    }
}

pub fn estimate_from_bytes(bytes: &[u8]) -> usize {
    let pages = PAGE_MARKER.find_iter(bytes).count();
    if pages > 0 {
        return pages;
    }

    let objects = OBJECT_MARKER.find_iter(bytes).count();
    if objects > MIN_OBJECTS_FOR_ESTIMATE {
        return objects.div_ceil(OBJECTS_PER_PAGE).max(1);
    }

    1
}

/// Count pages of `path` using `strategy`.
///
/// A password-protected document is fatal under every strategy that
/// consults the parser.
pub async fn determine_page_count(
    rasterizer: &dyn PageRasterizer,
    path: &Path,
    strategy: PageCountStrategy,
) -> Result<PageCount, PageCountError> {
    let count = match strategy {
        PageCountStrategy::Heuristic => Ok(PageCount {
            pages: estimate_page_count(path).await,
            estimated: true,
            warning: None,
        }),
        PageCountStrategy::Authoritative => {
            let pages = rasterizer.page_count(path).await?;
            Ok(PageCount {
                pages,
                estimated: false,
                warning: None,
            })
        }
        PageCountStrategy::AuthoritativeWithFallback => match rasterizer.page_count(path).await {
            Ok(pages) => Ok(PageCount {
                pages,
                estimated: false,
                warning: None,
            }),
            Err(PageCountError::PasswordProtected) => Err(PageCountError::PasswordProtected),
            Err(e) => {
                let pages = estimate_page_count(path).await;
                warn!("{}; estimated {} page(s) from raw bytes", e, pages);
                Ok(PageCount {
                    pages,
                    estimated: true,
                    warning: Some(format!("{e}. Page count estimated as {pages}.")),
                })
            }
        },
    }?;
    debug!("Page count for {}: {:?}", path.display(), count);
    Ok(count)
}
