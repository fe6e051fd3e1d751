//! Orchestration: run render → annotate → extract over one PDF or a batch.
//!
//! The stages stay independent (each only reads the previous stage's files).
//! When they run back to back the annotator is handed the renderer's page
//! list, so it annotates exactly the pages that were just written rather
//! than whatever else sits in the directory.
//!
//! A stage that produced nothing stops the document: there is no point in
//! annotating zero images or extracting from zero records. The report says
//! which stage came up empty.

use crate::config::PipelineConfig;
use crate::error::Pdf2HtmlError;
use crate::output::{BatchReport, DocumentReport};
use crate::pipeline::annotate::annotate_pages;
use crate::pipeline::extract::extract_dir;
use crate::pipeline::input;
use crate::pipeline::llm::VisionModel;
use crate::pipeline::render::render_resolved;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Run all three stages for one PDF, writing every artifact into `img_dir`.
///
/// # Arguments
/// * `input`   : Local file path or HTTP/HTTPS URL to a PDF
/// * `img_dir` : Directory for page images, records and fragments
/// * `model`   : Vision model used by the annotator
/// * `config`  : Pipeline configuration
///
/// # Errors
/// Fatal preconditions of any stage (see [`Pdf2HtmlError`]). A stage that
/// merely produced nothing is reported through [`DocumentReport::is_success`].
pub async fn process_document<M: VisionModel>(
    input: &str,
    img_dir: &Path,
    model: &M,
    config: &PipelineConfig,
) -> Result<DocumentReport, Pdf2HtmlError> {
    let start = Instant::now();
    info!("Processing {}", input);

    // ── Step 1: Render ───────────────────────────────────────────────────
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    let rendered = render_resolved(&resolved, img_dir, config).await?;

    let mut report = DocumentReport {
        input: input.to_string(),
        img_dir: img_dir.to_path_buf(),
        rendered: rendered.pages.len(),
        annotation: None,
        extraction: None,
    };
    if !rendered.is_success() {
        warn!("No pages rendered from {}; skipping annotation", input);
        return Ok(report);
    }

    // ── Step 2: Annotate ─────────────────────────────────────────────────
    let responses_dir = config.responses_dir_in(img_dir);
    let annotation = annotate_pages(&rendered.pages, model, &responses_dir, config).await?;
    let annotated = annotation.is_success();
    report.annotation = Some(annotation);
    if !annotated {
        warn!("No responses written for {}; skipping extraction", input);
        return Ok(report);
    }

    // ── Step 3: Extract ──────────────────────────────────────────────────
    report.extraction = Some(extract_dir(img_dir, config).await?);

    info!(
        "Finished {} in {}ms (success: {})",
        input,
        start.elapsed().as_millis(),
        report.is_success()
    );
    Ok(report)
}

/// Run [`process_document`] for every `*.pdf` in `batch_dir`.
///
/// Each PDF gets its own directory, `{out_root}/{pdf_stem}/`. PDFs are taken
/// in file-name order. A fatal error for one PDF is recorded in
/// [`BatchReport::errors`] and the batch moves on to the next file.
///
/// # Errors
/// [`Pdf2HtmlError::DirectoryNotFound`] when `batch_dir` does not exist.
pub async fn process_batch<M: VisionModel>(
    batch_dir: &Path,
    out_root: &Path,
    model: &M,
    config: &PipelineConfig,
) -> Result<BatchReport, Pdf2HtmlError> {
    let pdfs = list_pdfs(batch_dir)?;
    info!("Found {} PDFs in '{}'", pdfs.len(), batch_dir.display());

    let mut report = BatchReport::default();
    for pdf in pdfs {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let img_dir = out_root.join(&stem);
        let input = pdf.to_string_lossy().into_owned();

        match process_document(&input, &img_dir, model, config).await {
            Ok(doc) => report.documents.push(doc),
            Err(e) => {
                warn!("Skipping {}: {}", pdf.display(), e);
                report.errors.push((pdf, e.to_string()));
            }
        }
    }

    info!(
        "Batch complete: {}/{} documents succeeded",
        report.documents.iter().filter(|d| d.is_success()).count(),
        report.documents.len() + report.errors.len()
    );
    Ok(report)
}

/// Regular files with a `.pdf` extension (any case), sorted by name.
fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, Pdf2HtmlError> {
    if !dir.is_dir() {
        return Err(Pdf2HtmlError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let read_failed = |source| Pdf2HtmlError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    };

    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_failed)? {
        let path = entry.map_err(read_failed)?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::EncodedImage;
    use crate::pipeline::llm::VisionError;

    struct Unreachable;

    impl VisionModel for Unreachable {
        async fn describe(&self, _prompt: &str, _image: &EncodedImage) -> Result<String, VisionError> {
            panic!("model must not be called");
        }

        fn model_name(&self) -> &str {
            "unreachable"
        }
    }

    #[test]
    fn lists_only_pdfs_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf.bak"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.pdf")).unwrap();

        let names: Vec<String> = list_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn missing_batch_dir_is_fatal() {
        let out = tempfile::tempdir().unwrap();
        let err = process_batch(
            Path::new("/no/such/pdfs"),
            out.path(),
            &Unreachable,
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::DirectoryNotFound { .. }));
    }

    #[tokio::test]
    async fn bad_pdf_is_recorded_and_batch_continues() {
        let batch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(batch.path().join("a.pdf"), b"not a pdf").unwrap();
        std::fs::write(batch.path().join("b.pdf"), b"also not a pdf").unwrap();

        let report = process_batch(batch.path(), out.path(), &Unreachable, &PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 2);
        assert!(report.documents.is_empty());
        assert!(!report.is_success());
        assert!(!out.path().join("a").exists());
    }
}
