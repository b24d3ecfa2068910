//! Source resolution: turn a caller-supplied path into a [`SourceDocument`].
//!
//! The caller owns the file. Nothing here copies or deletes it; we only check
//! that it exists, is readable, has an extension we know how to ingest and
//! fits under the size ceiling before any heavier stage touches it.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The three families of upload the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// A PDF, rasterised and OCR'd page by page.
    Pdf,
    /// A single raster image, OCR'd once.
    Image,
    /// A Word document; raw text is read directly.
    Docx,
}

impl DocumentKind {
    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" => Some(DocumentKind::Image),
            _ => None,
        }
    }

    /// Map a MIME type to a kind, for hosts that only have the declared type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentKind::Docx)
            }
            "image/jpeg" | "image/jpg" | "image/png" | "image/gif" | "image/bmp"
            | "image/tiff" => Some(DocumentKind::Image),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Docx => "docx",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved upload, ready for validation and extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// Extension as found on the path, lowercased.
    pub declared_extension: String,
    pub byte_size: u64,
}

/// Extension of `path`, lowercased, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Resolve `path` into a [`SourceDocument`].
///
/// Rejects, in order: missing files, unreadable files, unsupported
/// extensions and files larger than `max_bytes`.
pub async fn resolve_source(path: &Path, max_bytes: u64) -> Result<SourceDocument, IngestError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };

    // Opening is the only reliable readability check across platforms.
    if let Err(e) = tokio::fs::File::open(path).await {
        return Err(match e.kind() {
            std::io::ErrorKind::PermissionDenied => IngestError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => IngestError::FileNotFound {
                path: path.to_path_buf(),
            },
        });
    }

    let declared_extension = extension_of(path);
    let kind = DocumentKind::from_extension(&declared_extension).ok_or_else(|| {
        IngestError::UnsupportedFormat {
            extension: declared_extension.clone(),
        }
    })?;

    let byte_size = meta.len();
    if byte_size > max_bytes {
        return Err(IngestError::FileTooLarge {
            path: path.to_path_buf(),
            size_mb: bytes_to_mb(byte_size),
            max_mb: bytes_to_mb(max_bytes),
        });
    }

    debug!(
        "Resolved {} upload: {} ({} bytes)",
        kind,
        path.display(),
        byte_size
    );

    Ok(SourceDocument {
        path: path.to_path_buf(),
        kind,
        declared_extension,
        byte_size,
    })
}

/// Whole megabytes, rounded up so a 100.2 MB file never reads as "100 MB".
pub(crate) fn bytes_to_mb(bytes: u64) -> u64 {
    bytes.div_ceil(1024 * 1024)
}
