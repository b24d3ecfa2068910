//! Text recognition engines.
//!
//! The orchestrator only sees the [`EngineFactory`] / [`RecognitionEngine`]
//! pair, so hosts can plug in another OCR backend and tests can script one.
//! The bundled backend drives the `tesseract` command-line tool: one child
//! process per image, fed from a scratch directory that lives exactly as long
//! as the engine.

use crate::config::IngestConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// A live recognition engine, created once per extraction.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Recognise the text in one encoded image (PNG, JPEG, TIFF, …).
    async fn recognize(&mut self, image: &[u8]) -> Result<String, EngineError>;

    /// Release the engine's resources. Called exactly once by the
    /// orchestrator; further calls must be harmless.
    async fn terminate(&mut self);
}

/// Creates [`RecognitionEngine`]s.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError>;
}

/// Factory for [`TesseractCliEngine`]s.
#[derive(Debug, Clone)]
pub struct TesseractCliFactory {
    binary: PathBuf,
    languages: String,
}

impl TesseractCliFactory {
    /// `languages` is passed to `-l` as is, e.g. `eng+deu`.
    pub fn new(binary: impl Into<PathBuf>, languages: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into(),
        }
    }

    /// Binary and languages taken from `config`.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.tesseract_binary.clone(), config.tesseract_languages())
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

#[async_trait]
impl EngineFactory for TesseractCliFactory {
    async fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        let probe = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                EngineError::Init(format!(
                    "cannot run '{}': {}",
                    self.binary.display(),
                    e
                ))
            })?;
        if !probe.status.success() {
            return Err(EngineError::Init(format!(
                "'{} --version' exited with {}",
                self.binary.display(),
                probe.status
            )));
        }

        let version = String::from_utf8_lossy(&probe.stdout);
        info!(
            "OCR engine ready: {} (languages: {})",
            version.lines().next().unwrap_or("tesseract").trim(),
            self.languages
        );

        let scratch = TempDir::new()
            .map_err(|e| EngineError::Init(format!("cannot create scratch directory: {e}")))?;

        Ok(Box::new(TesseractCliEngine {
            binary: self.binary.clone(),
            languages: self.languages.clone(),
            scratch: Some(scratch),
            calls: 0,
        }))
    }
}

/// Runs `tesseract <image> stdout -l <languages>` per image.
///
/// Dropping the engine (or the future of an in-flight
/// [`RecognitionEngine::recognize`]) kills the child process.
#[derive(Debug)]
pub struct TesseractCliEngine {
    binary: PathBuf,
    languages: String,
    scratch: Option<TempDir>,
    calls: usize,
}

#[async_trait]
impl RecognitionEngine for TesseractCliEngine {
    async fn recognize(&mut self, image: &[u8]) -> Result<String, EngineError> {
        let scratch = self
            .scratch
            .as_ref()
            .ok_or_else(|| EngineError::Recognition("engine already terminated".into()))?;
        self.calls += 1;
        let input = scratch.path().join(format!("input-{}", self.calls));
        tokio::fs::write(&input, image)
            .await
            .map_err(|e| EngineError::Recognition(format!("cannot stage image: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&input).await;

        let output = output.map_err(|e| EngineError::Recognition(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} chars", text.len());
        Ok(text)
    }

    async fn terminate(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                debug!("Failed to remove OCR scratch dir {}: {}", path.display(), e);
            }
        }
    }
}
