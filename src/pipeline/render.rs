//! Renderer: rasterise every page of a PDF to `p{n}.{ext}` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole rasterisation. The work runs on Tokio's
//! blocking pool so async callers never stall a worker thread.
//!
//! ## Failure policy
//!
//! Opening the document is all-or-nothing: a missing, unreadable or corrupt
//! PDF returns an error before the output directory is created. After that,
//! each page is on its own; a page that fails to rasterise or save is
//! reported in [`RenderOutput::failures`] and the next page is tried.

use crate::config::{PipelineConfig, RasterFormat};
use crate::error::{PageError, Pdf2HtmlError};
use crate::naming::page_file_name;
use crate::output::{PageImage, RenderOutput};
use crate::pipeline::input::{self, ResolvedInput};
use crate::progress::{ProgressCallback, Stage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Everything the blocking render needs, detached from the config borrow.
struct RenderJob {
    pdf_path: PathBuf,
    out_dir: PathBuf,
    scale: f32,
    format: RasterFormat,
    password: Option<String>,
    pdfium_lib_path: Option<PathBuf>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

/// Render every page of `input` (local path or URL) into `out_dir`.
///
/// Returns the page records in document order. `out_dir` is created if it
/// does not exist.
///
/// # Errors
/// Fatal conditions only: missing/unreadable/non-PDF input, failed download,
/// encrypted document without the right password, pdfium unavailable, or an
/// output directory that cannot be created.
pub async fn render_pdf(
    input: &str,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<RenderOutput, Pdf2HtmlError> {
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    render_resolved(&resolved, out_dir, config).await
}

/// Render an already-resolved input; see [`render_pdf`].
pub async fn render_resolved(
    resolved: &ResolvedInput,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<RenderOutput, Pdf2HtmlError> {
    info!("Rendering PDF: {}", resolved.path().display());

    let job = RenderJob {
        pdf_path: resolved.path().to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        scale: config.dpi as f32 / POINTS_PER_INCH,
        format: config.image_format,
        password: config.password.clone(),
        pdfium_lib_path: config.pdfium_lib_path.clone(),
        progress: config.progress_callback.clone(),
    };

    let output = tokio::task::spawn_blocking(move || render_blocking(job))
        .await
        .map_err(|e| Pdf2HtmlError::Internal(format!("Render task panicked: {}", e)))??;

    info!(
        "Rendered {}/{} pages into '{}'",
        output.pages.len(),
        output.total_pages,
        out_dir.display()
    );
    Ok(output)
}

/// Bind pdfium from an explicit library path or the system search path.
///
/// `lib_path` may point at the library file itself or at the directory that
/// contains it.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, Pdf2HtmlError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2HtmlError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn render_blocking(job: RenderJob) -> Result<RenderOutput, Pdf2HtmlError> {
    let pdfium = bind_pdfium(job.pdfium_lib_path.as_deref())?;

    let document = pdfium
        .load_pdf_from_file(&job.pdf_path, job.password.as_deref())
        .map_err(|e| classify_load_error(&job.pdf_path, job.password.is_some(), e))?;

    std::fs::create_dir_all(&job.out_dir).map_err(|source| Pdf2HtmlError::OutputWriteFailed {
        path: job.out_dir.clone(),
        source,
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if let Some(cb) = &job.progress {
        cb.on_stage_start(Stage::Render, total_pages);
    }

    let render_config = PdfRenderConfig::new().scale_page_by_factor(job.scale);
    let mut output = RenderOutput {
        total_pages,
        ..Default::default()
    };

    for (i, page) in pages.iter().enumerate() {
        let index = i as u32 + 1;
        if let Some(cb) = &job.progress {
            cb.on_page_start(Stage::Render, index);
        }

        let rendered = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))
            .and_then(|bitmap| {
                // Pdfium hands back BGRA; pages are stored as 3-channel colour.
                let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
                let path = job
                    .out_dir
                    .join(page_file_name(index, job.format.extension()));
                image
                    .save_with_format(&path, job.format.image_format())
                    .map_err(|e| e.to_string())?;
                Ok((path, image.width(), image.height()))
            });

        match rendered {
            Ok((path, width, height)) => {
                debug!(
                    "Saved page {} → {} ({}x{} px)",
                    index,
                    path.display(),
                    width,
                    height
                );
                if let Some(cb) = &job.progress {
                    cb.on_page_complete(Stage::Render, index);
                }
                output.pages.push(PageImage { index, path });
            }
            Err(detail) => {
                warn!("Page {}: rasterisation failed: {}", index, detail);
                if let Some(cb) = &job.progress {
                    cb.on_page_error(Stage::Render, index, &detail);
                }
                output.failures.push(PageError::RenderFailed {
                    page: index,
                    detail,
                });
            }
        }
    }

    if let Some(cb) = &job.progress {
        cb.on_stage_complete(Stage::Render, total_pages, output.pages.len());
    }

    Ok(output)
}

/// Map a pdfium load error onto the fatal error taxonomy.
fn classify_load_error(path: &Path, had_password: bool, e: PdfiumError) -> Pdf2HtmlError {
    let detail = format!("{:?}", e);
    if detail.to_lowercase().contains("password") {
        if had_password {
            Pdf2HtmlError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2HtmlError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2HtmlError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}
