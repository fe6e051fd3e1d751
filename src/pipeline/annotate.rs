//! Annotator: one vision-model call per page image, one response record per page.
//!
//! Every page is isolated: an undecodable image, transport failure or
//! unwritable record is logged and recorded in
//! [`AnnotationReport::failures`], and the batch moves on. Only missing inputs
//! are fatal.
//!
//! ## Concurrency
//!
//! Pages go through a `buffer_unordered` pool of `config.concurrency`
//! requests (1 by default, i.e. strictly sequential). Each page writes only
//! its own `p{n}.json`, so write targets stay partitioned by index at any
//! pool size. A page's bitmap is decoded when its turn comes and dropped once
//! encoded, so memory follows the pool size rather than the page count.
//!
//! ## Retry Strategy
//!
//! Off by default (`max_retries = 0`). When enabled, only retryable errors
//! (transport, 429, 5xx) are retried, with exponential backoff
//! (`retry_backoff_ms * 2^attempt`) unless the server sent `retry-after`.
//! A page whose retries are exhausted is skipped like any other failure.

use crate::config::PipelineConfig;
use crate::error::{PageError, Pdf2HtmlError};
use crate::naming::response_file_name;
use crate::output::{AnnotationReport, PageImage, ResponseRecord};
use crate::pipeline::discover::{discover_images, load_page_image};
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::llm::{VisionError, VisionModel};
use crate::pipeline::write_artifact;
use crate::progress::Stage;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Discover the page images in `img_dir` and annotate them.
///
/// Records go to `{img_dir}/{config.responses_dir}/p{n}.json`.
///
/// # Errors
/// - [`Pdf2HtmlError::DirectoryNotFound`] when `img_dir` does not exist
/// - [`Pdf2HtmlError::NoImagesFound`] when it holds no page image file;
///   the model is never called in that case
/// - [`Pdf2HtmlError::OutputWriteFailed`] when the responses directory
///   cannot be created
pub async fn annotate_dir<M: VisionModel>(
    img_dir: &Path,
    model: &M,
    config: &PipelineConfig,
) -> Result<AnnotationReport, Pdf2HtmlError> {
    let pages = discover_images(img_dir)?;
    if pages.is_empty() {
        return Err(Pdf2HtmlError::NoImagesFound {
            path: img_dir.to_path_buf(),
        });
    }

    let responses_dir = config.responses_dir_in(img_dir);
    annotate_pages(&pages, model, &responses_dir, config).await
}

/// Annotate the given page images, writing records into `responses_dir`.
///
/// The input order does not matter; records are keyed by `PageImage::index`.
pub async fn annotate_pages<M: VisionModel>(
    pages: &[PageImage],
    model: &M,
    responses_dir: &Path,
    config: &PipelineConfig,
) -> Result<AnnotationReport, Pdf2HtmlError> {
    let start = Instant::now();
    let prompt = config.prompt();
    if prompt.trim().is_empty() {
        return Err(Pdf2HtmlError::EmptyPrompt);
    }

    tokio::fs::create_dir_all(responses_dir)
        .await
        .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
            path: responses_dir.to_path_buf(),
            source,
        })?;

    info!(
        "Annotating {} pages with '{}' (concurrency {})",
        pages.len(),
        model.model_name(),
        config.concurrency
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_stage_start(Stage::Annotate, pages.len());
    }

    let results: Vec<Result<u32, PageError>> = stream::iter(pages.iter().map(|page| async move {
        if let Some(cb) = &config.progress_callback {
            cb.on_page_start(Stage::Annotate, page.index);
        }
        let result = annotate_one(page, model, prompt, responses_dir, config).await;
        if let Some(cb) = &config.progress_callback {
            match &result {
                Ok(index) => cb.on_page_complete(Stage::Annotate, *index),
                Err(e) => cb.on_page_error(Stage::Annotate, page.index, &e.to_string()),
            }
        }
        result
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    let mut report = AnnotationReport {
        attempted: pages.len(),
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(index) => report.written.push(index),
            Err(e) => {
                warn!("{}", e);
                report.failures.push(e);
            }
        }
    }
    report.written.sort_unstable();
    report.failures.sort_by_key(|e| e.page());
    report.duration_ms = start.elapsed().as_millis() as u64;

    if let Some(cb) = &config.progress_callback {
        cb.on_stage_complete(Stage::Annotate, pages.len(), report.written.len());
    }
    info!(
        "Annotation complete: {}/{} records in {}ms",
        report.written.len(),
        report.attempted,
        report.duration_ms
    );
    Ok(report)
}

/// Load, encode, call the model and persist the record for a single page.
async fn annotate_one<M: VisionModel>(
    page: &PageImage,
    model: &M,
    prompt: &str,
    responses_dir: &Path,
    config: &PipelineConfig,
) -> Result<u32, PageError> {
    let index = page.index;
    let encoded = load_and_encode(page.clone()).await?;

    info!("Sending image {} ({}) to {}", index, page.file_name(), model.model_name());
    let reply = describe_with_retry(model, prompt, &encoded, index, config).await?;

    let record = ResponseRecord {
        image: page.file_name(),
        prompt: prompt.to_string(),
        response: reply,
        page: Some(index),
        model: Some(model.model_name().to_string()),
    };
    let file_name = response_file_name(index);
    let path = responses_dir.join(&file_name);
    let write_failed = |detail: String| PageError::WriteFailed {
        page: index,
        file: file_name.clone(),
        detail,
    };

    let json = serde_json::to_vec_pretty(&record).map_err(|e| write_failed(e.to_string()))?;
    write_artifact(&path, &json)
        .await
        .map_err(|e| write_failed(e.to_string()))?;

    debug!("Saved response to: {}", path.display());
    Ok(index)
}

/// Decode and encode one page on the blocking pool; the bitmap is dropped here.
async fn load_and_encode(page: PageImage) -> Result<EncodedImage, PageError> {
    let index = page.index;
    tokio::task::spawn_blocking(move || {
        let img = load_page_image(&page)?;
        encode_page(&img).map_err(|e| PageError::EncodeFailed {
            page: index,
            detail: e.to_string(),
        })
    })
    .await
    .map_err(|e| PageError::EncodeFailed {
        page: index,
        detail: format!("encode task panicked: {}", e),
    })?
}

async fn describe_with_retry<M: VisionModel>(
    model: &M,
    prompt: &str,
    image: &EncodedImage,
    index: u32,
    config: &PipelineConfig,
) -> Result<String, PageError> {
    let mut attempt: u32 = 0;
    loop {
        let err: VisionError = match model.describe(prompt, image).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        if attempt >= config.max_retries || !err.is_retryable() {
            return Err(PageError::ModelFailed {
                page: index,
                retries: attempt,
                detail: err.to_string(),
            });
        }

        let backoff = err.retry_after().unwrap_or_else(|| {
            Duration::from_millis(config.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
        });
        attempt += 1;
        warn!(
            "Page {}: {} (retry {}/{} after {}ms)",
            index,
            err,
            attempt,
            config.max_retries,
            backoff.as_millis()
        );
        sleep(backoff).await;
    }
}
