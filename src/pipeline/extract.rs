//! Extractor: fenced markup out of each response record, into fragment files.
//!
//! For every `p{n}.json` in the responses directory the first
//! ```` ```html ```` … ```` ``` ```` block of the reply is written to
//! `{img_dir}/p{n}.html`, and all fragments are joined into the combined
//! document. A record without a fenced block (or with an empty one) yields
//! no fragment; it is logged, listed in [`ExtractionReport::missing`], and
//! the rest of the directory is still processed.
//!
//! Outputs always mirror the current records: a page that yields no fragment
//! loses any `p{n}.html` left by an earlier run, and a run with no fragments
//! at all removes the old combined document.

use crate::config::PipelineConfig;
use crate::error::{PageError, Pdf2HtmlError};
use crate::naming::page_file_name;
use crate::output::{ExtractionReport, Fragment, ResponseRecord};
use crate::pipeline::assemble::assemble_document;
use crate::pipeline::discover::discover_responses;
use crate::pipeline::write_artifact;
use crate::progress::Stage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

static HTML_FENCE: Lazy<FenceExtractor> =
    Lazy::new(|| FenceExtractor::new("html").unwrap());

/// Finds the first fenced block tagged with a given language.
#[derive(Debug, Clone)]
pub struct FenceExtractor {
    re: Regex,
}

impl FenceExtractor {
    /// Matcher for ```` ```{language} ```` followed by a line break.
    ///
    /// # Errors
    /// [`Pdf2HtmlError::InvalidConfig`] when `language` is blank.
    pub fn new(language: &str) -> Result<Self, Pdf2HtmlError> {
        let language = language.trim();
        if language.is_empty() {
            return Err(Pdf2HtmlError::InvalidConfig(
                "fence language must not be empty".into(),
            ));
        }
        let pattern = format!(r"(?s)```{}\r?\n(.*?)```", regex::escape(language));
        let re = Regex::new(&pattern)
            .map_err(|e| Pdf2HtmlError::InvalidConfig(format!("fence pattern: {e}")))?;
        Ok(Self { re })
    }

    /// Body of the first fenced block, or `None` when there is none or it is empty.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        let body = self.re.captures(text)?.get(1)?.as_str();
        if body.is_empty() {
            None
        } else {
            Some(body)
        }
    }
}

/// Body of the first ```` ```html ```` block in `text`.
pub fn extract_fragment(text: &str) -> Option<&str> {
    HTML_FENCE.extract(text)
}

/// Extract fragments from `{img_dir}/{responses_dir}` and write them, plus
/// the combined document, into `img_dir`.
///
/// # Errors
/// - [`Pdf2HtmlError::DirectoryNotFound`] when the responses directory is missing
/// - [`Pdf2HtmlError::OutputWriteFailed`] when the combined document cannot be
///   written, or a stale one cannot be removed
pub async fn extract_dir(
    img_dir: &Path,
    config: &PipelineConfig,
) -> Result<ExtractionReport, Pdf2HtmlError> {
    let responses_dir = config.responses_dir_in(img_dir);
    let records = discover_responses(&responses_dir)?;
    let extractor = FenceExtractor::new(&config.fence_language)?;

    info!(
        "Extracting '{}' blocks from {} records in '{}'",
        config.fence_language,
        records.len(),
        responses_dir.display()
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_stage_start(Stage::Extract, records.len());
    }

    let mut report = ExtractionReport::default();
    for (index, path) in &records {
        let index = *index;
        if let Some(cb) = &config.progress_callback {
            cb.on_page_start(Stage::Extract, index);
        }

        match extract_one(index, path, img_dir, &extractor, config).await {
            Ok(Some(fragment)) => {
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_complete(Stage::Extract, index);
                }
                report.fragments.push(fragment);
            }
            Ok(None) => {
                let file = file_name(path);
                warn!("No {} content found in {}", config.fence_language, file);
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_error(Stage::Extract, index, "no fenced block");
                }
                report.missing.push(index);
                report
                    .failures
                    .push(PageError::FenceNotFound { page: index, file });
                remove_stale_fragment(index, img_dir, config).await;
            }
            Err(e) => {
                warn!("{}", e);
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_error(Stage::Extract, index, &e.to_string());
                }
                report.failures.push(e);
                remove_stale_fragment(index, img_dir, config).await;
            }
        }
    }

    let combined_path = config.combined_path_in(img_dir);
    if report.fragments.is_empty() {
        if remove_if_present(&combined_path)
            .await
            .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
                path: combined_path.clone(),
                source,
            })?
        {
            info!("Removed stale combined file: {}", combined_path.display());
        }
    } else {
        let html = assemble_document(&report.fragments, &config.document_title);
        write_artifact(&combined_path, html.as_bytes())
            .await
            .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
                path: combined_path.clone(),
                source,
            })?;
        info!("Created combined HTML file: {}", combined_path.display());
        report.combined_path = Some(combined_path);
    }

    if let Some(cb) = &config.progress_callback {
        cb.on_stage_complete(Stage::Extract, records.len(), report.fragments.len());
    }
    info!(
        "Extraction complete: {}/{} fragments, {} without a fenced block",
        report.fragments.len(),
        records.len(),
        report.missing.len()
    );
    Ok(report)
}

/// Read one record and write its fragment. `Ok(None)` means no fenced block.
async fn extract_one(
    index: u32,
    path: &Path,
    img_dir: &Path,
    extractor: &FenceExtractor,
    config: &PipelineConfig,
) -> Result<Option<Fragment>, PageError> {
    let unreadable = |detail: String| PageError::RecordUnreadable {
        file: path.display().to_string(),
        detail,
    };
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    let record: ResponseRecord =
        serde_json::from_slice(&raw).map_err(|e| unreadable(e.to_string()))?;

    let Some(markup) = extractor.extract(&record.response) else {
        return Ok(None);
    };

    let fragment_name = page_file_name(index, &config.fragment_extension);
    let fragment_path = img_dir.join(&fragment_name);
    write_artifact(&fragment_path, markup.as_bytes())
        .await
        .map_err(|e| PageError::WriteFailed {
            page: index,
            file: fragment_name,
            detail: e.to_string(),
        })?;
    debug!("Created {}", fragment_path.display());

    Ok(Some(Fragment {
        index,
        markup: markup.to_string(),
    }))
}

/// Drop the `p{n}` fragment of a page that produced none this run.
async fn remove_stale_fragment(index: u32, img_dir: &Path, config: &PipelineConfig) {
    let path = img_dir.join(page_file_name(index, &config.fragment_extension));
    match remove_if_present(&path).await {
        Ok(true) => info!("Removed stale fragment: {}", path.display()),
        Ok(false) => {}
        Err(e) => warn!("Failed to remove stale fragment {}: {}", path.display(), e),
    }
}

/// Remove `path`; `Ok(false)` when there was nothing to remove.
async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
