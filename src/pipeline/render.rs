//! PDF rasterisation: render one page at a time to PNG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for as long as a page takes to draw. Every pdfium call
//! therefore runs on Tokio's blocking pool, and the async side only waits
//! on it through [`run_with_timeout`]. A task that loses the race keeps
//! running on its blocking thread; its document is still dropped there when
//! it finishes, and nobody reads the result.
//!
//! ## Why cap pixels?
//!
//! Exam papers arrive as anything from phone scans to A3 posters. Scaling by
//! a fixed factor and then clamping the longest edge keeps memory bounded
//! while leaving ordinary A4 pages at a resolution tesseract reads well.

use crate::bounded::{run_with_timeout, TimeoutError};
use crate::config::IngestConfig;
use crate::error::{IngestError, PageCountError, PageError};
use crate::pipeline::encode::{encode_png, encode_png_compact};
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Environment variable consulted when no library path is configured.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

const PLACEHOLDER_WIDTH: u32 = 800;
const PLACEHOLDER_HEIGHT: u32 = 600;
const PLACEHOLDER_BACKGROUND: [u8; 4] = [240, 240, 240, 255];

/// A single rasterised page, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `true` when the page could not be drawn and this is the synthetic
    /// "Error rendering page N" image.
    pub placeholder: bool,
}

impl PageImage {
    pub fn from_image(
        page_num: usize,
        img: &DynamicImage,
        compact: bool,
    ) -> Result<Self, image::ImageError> {
        let png = if compact {
            encode_png_compact(img)?
        } else {
            encode_png(img)?
        };
        Ok(Self {
            page_num,
            png,
            width: img.width(),
            height: img.height(),
            placeholder: false,
        })
    }
}

/// Turns PDF pages into images.
///
/// Page numbers are 1-indexed throughout.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document's page tree.
    async fn page_count(&self, path: &Path) -> Result<usize, PageCountError>;

    /// Full-fidelity render of one page.
    async fn render(&self, path: &Path, page_num: usize) -> Result<PageImage, PageError>;

    /// Degraded render used after [`PageRasterizer::render`] failed.
    ///
    /// Implementations may substitute a placeholder image instead of
    /// failing.
    async fn render_preview(&self, path: &Path, page_num: usize) -> Result<PageImage, PageError>;

    /// Check the backend is usable before a PDF is started.
    ///
    /// Errors here are fatal for the document; the default has nothing to
    /// check.
    async fn prepare(&self) -> Result<(), IngestError> {
        Ok(())
    }
}

// ── Rendering environment ────────────────────────────────────────────────

/// Where to find the pdfium shared library.
///
/// Built once per pipeline and shared by `Arc`. Each blocking task binds
/// its own [`Pdfium`] instance from this, so no pdfium state is ever
/// shared across threads. The first successful or failed binding is
/// remembered, so a missing library is reported once per pipeline.
#[derive(Debug, Clone)]
pub struct RenderingEnvironment {
    library_path: Option<PathBuf>,
    bound: OnceCell<Result<(), String>>,
}

impl RenderingEnvironment {
    /// Resolve the library location without loading it.
    ///
    /// `library_path` may name the library file or its directory. When it is
    /// `None`, `PDFIUM_LIB_PATH` is consulted, then the working directory,
    /// then the system library path. Nothing is loaded until the first PDF.
    pub fn deferred(library_path: Option<PathBuf>) -> Arc<Self> {
        let library_path =
            library_path.or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));
        Arc::new(Self {
            library_path,
            bound: OnceCell::new(),
        })
    }

    /// Resolve the library location and check now that it can be bound.
    pub fn initialise(library_path: Option<PathBuf>) -> Result<Arc<Self>, IngestError> {
        let env = Self::deferred(library_path);
        env.ensure_bound()?;
        Ok(env)
    }

    /// Bind the library once and return the remembered outcome.
    ///
    /// Blocks while the library loads; call from a blocking thread.
    pub fn ensure_bound(&self) -> Result<(), IngestError> {
        self.bound
            .get_or_init(|| match self.pdfium() {
                Ok(_) => {
                    info!(
                        "pdfium bound from {}",
                        self.library_path
                            .as_deref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "default search path".to_string())
                    );
                    Ok(())
                }
                Err(e) => Err(format!("{e:?}")),
            })
            .clone()
            .map_err(IngestError::PdfiumBindingFailed)
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    /// Bind a fresh pdfium instance. Call from a blocking thread.
    pub(crate) fn pdfium(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }?;
        Ok(Pdfium::new(bindings))
    }
}

// ── Render profiles ──────────────────────────────────────────────────────

/// Size, time and quality settings for one kind of render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProfile {
    pub scale: f32,
    pub max_dimension: u32,
    pub load_timeout: Duration,
    pub render_timeout: Duration,
    /// Draw annotations and form fields.
    pub draw_extras: bool,
    /// Use maximum PNG compression.
    pub compact: bool,
}

impl RenderProfile {
    pub fn full(config: &IngestConfig) -> Self {
        Self {
            scale: config.render_scale,
            max_dimension: config.max_dimension,
            load_timeout: config.document_load_timeout,
            render_timeout: config.render_timeout,
            draw_extras: true,
            compact: false,
        }
    }

    pub fn preview(config: &IngestConfig) -> Self {
        Self {
            scale: config.preview_scale,
            max_dimension: config.preview_max_dimension,
            load_timeout: config.preview_load_timeout,
            render_timeout: config.preview_render_timeout,
            draw_extras: false,
            compact: true,
        }
    }

    fn operations(&self) -> (&'static str, &'static str) {
        if self.draw_extras {
            ("PDF loading", "page rendering")
        } else {
            ("preview PDF loading", "preview rendering")
        }
    }
}

/// Pixel size of a `width_pt` × `height_pt` page drawn at `scale`, shrunk
/// uniformly so neither side exceeds `max_dimension`.
pub fn fit_within(width_pt: f32, height_pt: f32, scale: f32, max_dimension: u32) -> (u32, u32) {
    let w = (width_pt * scale).max(1.0);
    let h = (height_pt * scale).max(1.0);
    let longest = w.max(h);
    let factor = if longest > max_dimension as f32 {
        max_dimension as f32 / longest
    } else {
        1.0
    };
    (
        ((w * factor).round() as u32).max(1),
        ((h * factor).round() as u32).max(1),
    )
}

// ── pdfium implementation ────────────────────────────────────────────────

/// [`PageRasterizer`] backed by pdfium.
pub struct PdfiumRasterizer {
    env: Arc<RenderingEnvironment>,
    full: RenderProfile,
    preview: RenderProfile,
    document_load_timeout: Duration,
}

impl PdfiumRasterizer {
    pub fn new(env: Arc<RenderingEnvironment>, config: &IngestConfig) -> Self {
        Self {
            env,
            full: RenderProfile::full(config),
            preview: RenderProfile::preview(config),
            document_load_timeout: config.document_load_timeout,
        }
    }

    async fn rasterise(
        &self,
        path: &Path,
        page_num: usize,
        profile: RenderProfile,
    ) -> Result<PageImage, PageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PageError::ConversionFailed {
                page: page_num,
                detail: e.to_string(),
            })?;
        let (load_op, render_op) = profile.operations();
        let env = Arc::clone(&self.env);
        let (loaded_tx, loaded_rx) = oneshot::channel();

        let handle = tokio::task::spawn_blocking(move || {
            render_blocking(&env, &bytes, page_num, profile, loaded_tx)
        });

        // A dropped sender means loading failed; the handle carries the error.
        if run_with_timeout(load_op, profile.load_timeout, loaded_rx)
            .await
            .map_err(|t| page_timeout(page_num, t))?
            .is_err()
        {
            debug!("Document load for page {} failed", page_num);
        }

        run_with_timeout(render_op, profile.render_timeout, handle)
            .await
            .map_err(|t| page_timeout(page_num, t))?
            .map_err(|e| PageError::ConversionFailed {
                page: page_num,
                detail: format!("render task panicked: {e}"),
            })?
    }

    async fn placeholder(&self, page_num: usize) -> Result<PageImage, PageError> {
        let env = Arc::clone(&self.env);
        tokio::task::spawn_blocking(move || placeholder_blocking(&env, page_num))
            .await
            .map_err(|e| PageError::ConversionFailed {
                page: page_num,
                detail: format!("placeholder task panicked: {e}"),
            })?
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn prepare(&self) -> Result<(), IngestError> {
        let env = Arc::clone(&self.env);
        tokio::task::spawn_blocking(move || env.ensure_bound())
            .await
            .map_err(|e| IngestError::Internal(format!("pdfium binding task panicked: {e}")))?
    }

    async fn page_count(&self, path: &Path) -> Result<usize, PageCountError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PageCountError::Failed {
                detail: e.to_string(),
            })?;
        let env = Arc::clone(&self.env);

        let handle = tokio::task::spawn_blocking(move || -> Result<usize, PageCountError> {
            let pdfium = env.pdfium().map_err(|e| PageCountError::Failed {
                detail: format!("{e:?}"),
            })?;
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| PageCountError::from_parser_message(format!("{e:?}")))?;
            Ok(document.pages().len() as usize)
        });

        let pages = run_with_timeout("PDF loading", self.document_load_timeout, handle)
            .await
            .map_err(|t| PageCountError::Timeout {
                secs: t.after.as_secs(),
            })?
            .map_err(|e| PageCountError::Failed {
                detail: format!("page count task panicked: {e}"),
            })??;

        debug!("pdfium reports {} page(s) in {}", pages, path.display());
        Ok(pages)
    }

    async fn render(&self, path: &Path, page_num: usize) -> Result<PageImage, PageError> {
        self.rasterise(path, page_num, self.full).await
    }

    async fn render_preview(&self, path: &Path, page_num: usize) -> Result<PageImage, PageError> {
        match self.rasterise(path, page_num, self.preview).await {
            Ok(img) => Ok(img),
            Err(e) => {
                warn!("Preview of page {} failed ({}); using placeholder", page_num, e);
                self.placeholder(page_num).await
            }
        }
    }
}

fn page_timeout(page_num: usize, t: TimeoutError) -> PageError {
    PageError::Timeout {
        page: page_num,
        operation: t.operation.to_string(),
        secs: t.after.as_secs(),
    }
}

/// Blocking body of a render. Signals `loaded` once the document is parsed.
fn render_blocking(
    env: &RenderingEnvironment,
    bytes: &[u8],
    page_num: usize,
    profile: RenderProfile,
    loaded: oneshot::Sender<()>,
) -> Result<PageImage, PageError> {
    let conversion = |detail: String| PageError::ConversionFailed {
        page: page_num,
        detail,
    };

    let pdfium = env.pdfium().map_err(|e| conversion(format!("{e:?}")))?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PageError::classify(page_num, format!("{e:?}")))?;
    let _ = loaded.send(());

    let index = page_num
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| conversion(format!("page {page_num} is out of range")))?;
    let page = document
        .pages()
        .get(index)
        .map_err(|e| conversion(format!("{e:?}")))?;

    let (width, height) = fit_within(
        page.width().value,
        page.height().value,
        profile.scale,
        profile.max_dimension,
    );
    let mut cfg = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32);
    if !profile.draw_extras {
        cfg = cfg.render_annotations(false).render_form_data(false);
    }

    let image = page
        .render_with_config(&cfg)
        .map_err(|e| {
            debug!("pdfium render error on page {}: {:?}", page_num, e);
            PageError::Rendering { page: page_num }
        })?
        .as_image();

    debug!(
        "Rendered page {} → {}x{} px",
        page_num,
        image.width(),
        image.height()
    );

    PageImage::from_image(page_num, &image, profile.compact).map_err(|e| conversion(e.to_string()))
}

fn placeholder_blocking(env: &RenderingEnvironment, page_num: usize) -> Result<PageImage, PageError> {
    let image = draw_placeholder(env, page_num).unwrap_or_else(|e| {
        debug!("pdfium placeholder failed ({:?}); using blank page", e);
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            PLACEHOLDER_WIDTH,
            PLACEHOLDER_HEIGHT,
            Rgba(PLACEHOLDER_BACKGROUND),
        ))
    });
    let mut out = PageImage::from_image(page_num, &image, true).map_err(|e| {
        PageError::ConversionFailed {
            page: page_num,
            detail: e.to_string(),
        }
    })?;
    out.placeholder = true;
    Ok(out)
}

/// Lines drawn on the placeholder page.
pub fn placeholder_lines(page_num: usize) -> [String; 3] {
    [
        format!("Error rendering page {page_num}"),
        "This page contains elements that cannot be rendered.".to_string(),
        "Try converting the PDF to a simpler format.".to_string(),
    ]
}

/// Draw the placeholder text on a fresh single-page document.
fn draw_placeholder(env: &RenderingEnvironment, page_num: usize) -> Result<DynamicImage, PdfiumError> {
    let pdfium = env.pdfium()?;
    let mut document = pdfium.create_new_pdf()?;
    let font = document.fonts_mut().helvetica();
    let mut page = document.pages_mut().create_page_at_end(PdfPagePaperSize::new_custom(
        PdfPoints::new(PLACEHOLDER_WIDTH as f32),
        PdfPoints::new(PLACEHOLDER_HEIGHT as f32),
    ))?;

    // Baselines measured from the bottom edge.
    let [title, body, hint] = placeholder_lines(page_num);
    for (text, baseline, size) in [(title, 330.0, 24.0), (body, 280.0, 16.0), (hint, 250.0, 16.0)] {
        page.objects_mut().create_text_object(
            PdfPoints::new(60.0),
            PdfPoints::new(baseline),
            &text,
            font,
            PdfPoints::new(size),
        )?;
    }

    let [r, g, b, a] = PLACEHOLDER_BACKGROUND;
    let cfg = PdfRenderConfig::new()
        .set_target_width(PLACEHOLDER_WIDTH as i32)
        .set_maximum_height(PLACEHOLDER_HEIGHT as i32)
        .set_clear_color(PdfColor::new(r, g, b, a));
    let image = page.render_with_config(&cfg)?.as_image();
    Ok(image)
}
