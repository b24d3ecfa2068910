//! Structural pre-validation of PDF uploads.
//!
//! A cheap gate in front of pdfium: only the first few kilobytes of the file
//! and its metadata are read. The checks look for a PDF header, encryption
//! dictionaries, embedded 3D content and heavy graphics resources. None of
//! them parse the document.

use crate::pipeline::input::bytes_to_mb;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

const HEADER: &[u8] = b"%PDF-";
const ENCRYPTION_MARKERS: &[&[u8]] = &[b"/Encrypt"];
const THREE_D_MARKERS: &[&[u8]] = &[b"/3D", b"/PRC", b"/U3D"];
const COMPLEX_GRAPHICS_MARKERS: &[&[u8]] = &[b"/Shader", b"/Pattern", b"/XObject"];

/// Advice attached to every "file too large" rejection.
pub const SIZE_RECOMMENDATION: &str = "Reduce the file size or split the document into smaller parts.";

/// Bounds on what the validator reads and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Bytes sampled from the start of the file.
    pub sample_bytes: usize,
    /// Files larger than this are rejected.
    pub max_file_size_bytes: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            sample_bytes: crate::config::DEFAULT_VALIDATION_SAMPLE_BYTES,
            max_file_size_bytes: crate::config::DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// Outcome of [`validate_pdf`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` iff no issue has [`Severity::Error`].
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            message: message.into(),
        });
    }

    fn failed(message: String) -> Self {
        Self {
            is_valid: false,
            issues: vec![ValidationIssue {
                severity: Severity::Error,
                message,
            }],
            recommendations: Vec::new(),
        }
    }

    /// Message of the first error-severity issue.
    pub fn primary_error(&self) -> Option<&str> {
        self.issues
            .iter()
            .find(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }
}

/// Validate the PDF at `path`.
///
/// Never fails: I/O problems become a single error issue. Every check runs
/// even when an earlier one already marked the file invalid.
pub async fn validate_pdf(path: &Path, limits: ValidationLimits) -> ValidationReport {
    match run_checks(path, limits).await {
        Ok(report) => {
            debug!(
                "Validated {}: valid={} issues={}",
                path.display(),
                report.is_valid,
                report.issues.len()
            );
            report
        }
        Err(e) => {
            warn!("Could not validate {}: {}", path.display(), e);
            ValidationReport::failed(format!("Failed to validate PDF: {e}"))
        }
    }
}

async fn run_checks(path: &Path, limits: ValidationLimits) -> std::io::Result<ValidationReport> {
    let file = tokio::fs::File::open(path).await?;
    let mut sample = Vec::with_capacity(limits.sample_bytes);
    file.take(limits.sample_bytes as u64)
        .read_to_end(&mut sample)
        .await?;
    let size = tokio::fs::metadata(path).await?.len();

    let mut report = ValidationReport::default();

    if !sample.starts_with(HEADER) {
        report.push(
            Severity::Error,
            "Not a valid PDF file. The file does not have a proper PDF header.",
        );
    }

    if contains_any(&sample, ENCRYPTION_MARKERS) {
        report.push(
            Severity::Error,
            "The PDF file appears to be encrypted or password-protected.",
        );
        report
            .recommendations
            .push("Remove the password protection and try again.".to_string());
    }

    if contains_any(&sample, THREE_D_MARKERS) {
        report.push(
            Severity::Warning,
            "The PDF appears to contain 3D content, which may cause rendering issues.",
        );
        report
            .recommendations
            .push("Save the PDF as a flattened 2D document before uploading.".to_string());
    }

    if contains_any(&sample, COMPLEX_GRAPHICS_MARKERS) {
        report.push(
            Severity::Warning,
            "The PDF contains complex graphics elements that might affect processing.",
        );
    }

    if size > limits.max_file_size_bytes {
        report.push(
            Severity::Error,
            format!(
                "File is too large ({} MB). Maximum allowed size is {} MB.",
                bytes_to_mb(size),
                bytes_to_mb(limits.max_file_size_bytes)
            ),
        );
        report
            .recommendations
            .push(SIZE_RECOMMENDATION.to_string());
    }

    let has_errors = report.errors().next().is_some();
    report.is_valid = !has_errors;
    Ok(report)
}

fn contains_any(haystack: &[u8], needles: &[&[u8]]) -> bool {
    needles
        .iter()
        .any(|n| haystack.windows(n.len()).any(|w| w == *n))
}
