//! Document rendering: rasterise the leading pages of a fax and grade them.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. `tokio::task::spawn_blocking` moves rendering onto
//! the blocking pool so Tokio worker threads keep serving the classifier call.
//!
//! ## Page cap
//!
//! Long faxes (chart dumps, records bundles) are classified from a bounded
//! prefix: see [`crate::config::PageCapPolicy`]. Every page inside the prefix
//! must render; a single failed page fails the whole document, since a
//! classification made on a partial prefix cannot be trusted.
//!
//! Rendering goes through the [`PageSource`] trait so the cap and quality
//! policy can be exercised without pdfium.

use crate::config::{ClassifierConfig, PageCapPolicy};
use crate::error::TriageError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::quality::{analyze_page, PageAnalysis, QualityThresholds};
use crate::taxonomy::PageQuality;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Anything that can hand out page rasters by 0-based index.
pub trait PageSource {
    /// Path or label used in error messages.
    fn origin(&self) -> &Path;

    fn page_count(&self) -> usize;

    fn render_page(&self, index: usize) -> Result<DynamicImage, TriageError>;
}

/// Rendered prefix of one document, ready for the request builder.
#[derive(Debug, Clone)]
pub struct DocumentRenderResult {
    /// Encoded pages, in page order.
    pub images: Vec<ImageData>,
    pub total_page_count: usize,
    pub pages_processed_count: usize,
    pub overall_quality: PageQuality,
    pub page_analyses: Vec<PageAnalysis>,
}

/// The subset of [`ClassifierConfig`] the renderer needs.
///
/// Owned and `Send` so it can move into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub page_cap: PageCapPolicy,
    pub quality: QualityThresholds,
    pub password: Option<String>,
}

impl From<&ClassifierConfig> for RenderSettings {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            page_cap: config.page_cap,
            quality: config.quality,
            password: config.password.clone(),
        }
    }
}

/// Document-level quality: any poor or blank page makes the document poor;
/// it is good only if every page is good; otherwise fair.
pub fn aggregate_quality(analyses: &[PageAnalysis]) -> PageQuality {
    if analyses.is_empty()
        || analyses
            .iter()
            .any(|a| a.is_blank || a.quality == PageQuality::Poor)
    {
        PageQuality::Poor
    } else if analyses.iter().all(|a| a.quality == PageQuality::Good) {
        PageQuality::Good
    } else {
        PageQuality::Fair
    }
}

/// Render, analyze, and encode the capped page prefix of `source`.
pub fn render_from_source(
    source: &dyn PageSource,
    settings: &RenderSettings,
) -> Result<DocumentRenderResult, TriageError> {
    let total = source.page_count();
    if total == 0 {
        return Err(TriageError::EmptyDocument {
            path: source.origin().to_path_buf(),
        });
    }

    let to_process = settings.page_cap.pages_to_process(total);
    if to_process < total {
        info!(
            "{}: {} pages, classifying first {}",
            source.origin().display(),
            total,
            to_process
        );
    }

    let mut images = Vec::with_capacity(to_process);
    let mut analyses = Vec::with_capacity(to_process);

    for idx in 0..to_process {
        let page_num = idx + 1;
        let img = source.render_page(idx)?;
        let analysis = analyze_page(&img, &settings.quality);

        if analysis.is_blank {
            warn!("Page {} appears blank or black", page_num);
        }
        if analysis.resolution_inadequate(&settings.quality) {
            let (min_w, min_h) = settings.quality.min_resolution();
            warn!(
                "Page {} resolution {}x{} is below {}x{}",
                page_num, analysis.resolution.0, analysis.resolution.1, min_w, min_h
            );
        }
        debug!(
            "Page {}: brightness {:.1}, contrast {:.1}, quality {}",
            page_num, analysis.brightness, analysis.contrast, analysis.quality
        );

        images.push(encode_page(&img, page_num)?);
        analyses.push(analysis);
    }

    let overall_quality = aggregate_quality(&analyses);
    Ok(DocumentRenderResult {
        images,
        total_page_count: total,
        pages_processed_count: to_process,
        overall_quality,
        page_analyses: analyses,
    })
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, TriageError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .map(|p| {
            if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            }
        });

    let bindings = match from_env {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| TriageError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn open_error(path: &Path, password: Option<&str>, err: PdfiumError) -> TriageError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            TriageError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            TriageError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        TriageError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// [`PageSource`] over an open pdfium document.
pub struct PdfiumPages<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
    render_config: PdfRenderConfig,
}

impl<'a> PdfiumPages<'a> {
    pub fn open(
        pdfium: &'a Pdfium,
        path: &Path,
        settings: &'a RenderSettings,
    ) -> Result<Self, TriageError> {
        let password = settings.password.as_deref();
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| open_error(path, password, e))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(settings.dpi as f32 / 72.0)
            .set_maximum_width(settings.max_rendered_pixels as i32)
            .set_maximum_height(settings.max_rendered_pixels as i32);

        Ok(Self {
            path: path.to_path_buf(),
            document,
            render_config,
        })
    }
}

impl PageSource for PdfiumPages<'_> {
    fn origin(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, TriageError> {
        let page_num = index + 1;
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| TriageError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page
            .render_with_config(&self.render_config)
            .map_err(|e| TriageError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", page_num, image.width(), image.height());
        Ok(image)
    }
}

/// Render a PDF on disk.
pub async fn render_document(
    pdf_path: &Path,
    config: &ClassifierConfig,
) -> Result<DocumentRenderResult, TriageError> {
    let path = pdf_path.to_path_buf();
    let settings = RenderSettings::from(config);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let pages = PdfiumPages::open(&pdfium, &path, &settings)?;
        render_from_source(&pages, &settings)
    })
    .await
    .map_err(|e| TriageError::Internal(format!("Render task panicked: {}", e)))?
}

/// Turns a resolved PDF path into a [`DocumentRenderResult`].
///
/// The batch driver renders through this trait; [`PdfiumRenderer`] is the
/// production implementation.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        pdf_path: &Path,
        config: &ClassifierConfig,
    ) -> Result<DocumentRenderResult, TriageError>;
}

/// [`DocumentRenderer`] backed by [`render_document`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

#[async_trait]
impl DocumentRenderer for PdfiumRenderer {
    async fn render(
        &self,
        pdf_path: &Path,
        config: &ClassifierConfig,
    ) -> Result<DocumentRenderResult, TriageError> {
        render_document(pdf_path, config).await
    }
}

/// Page count of a PDF without rendering anything.
pub async fn inspect_page_count(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<usize, TriageError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || -> Result<usize, TriageError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(&path, pwd.as_deref())
            .map_err(|e| open_error(&path, pwd.as_deref(), e))?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| TriageError::Internal(format!("Inspect task panicked: {}", e)))?
}
