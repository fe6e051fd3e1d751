//! Records and reports produced by the pipeline stages.
//!
//! Every record is keyed by a page index; equal indices across record kinds
//! mean "the same logical page". Nothing here is updated in place once a
//! stage has produced it.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A page image on disk: written by the renderer or found by discovery.
///
/// Only the location is kept; the bitmap is decoded when the page is
/// annotated, so memory stays flat however long the document is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page index.
    pub index: u32,
    /// Where the image lives on disk.
    pub path: PathBuf,
}

impl PageImage {
    /// File name component of `path`, used in response records.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of rendering one PDF.
#[derive(Debug, Default)]
pub struct RenderOutput {
    /// Pages written, ascending by index.
    pub pages: Vec<PageImage>,
    /// Pages that could not be rasterised or written.
    pub failures: Vec<PageError>,
    /// Page count of the source document.
    pub total_pages: usize,
}

impl RenderOutput {
    /// `true` when at least one page image was written.
    pub fn is_success(&self) -> bool {
        !self.pages.is_empty()
    }
}

/// One persisted model reply (`p{n}.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// File name of the source page image.
    pub image: String,
    /// Prompt sent with the image.
    pub prompt: String,
    /// Raw reply text.
    pub response: String,
    /// Page index; optional so records from older tooling still parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Model that produced the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Result of annotating a set of page images.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AnnotationReport {
    /// Pages submitted to the model.
    pub attempted: usize,
    /// Indices with a response record written, ascending.
    pub written: Vec<u32>,
    /// Per-page failures (loading, encoding, model, write).
    pub failures: Vec<PageError>,
    /// Wall-clock time spent in the stage.
    pub duration_ms: u64,
}

impl AnnotationReport {
    /// `true` when at least one response record was written.
    pub fn is_success(&self) -> bool {
        !self.written.is_empty()
    }
}

/// Markup extracted from one response record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub index: u32,
    pub markup: String,
}

/// Result of extracting fragments from a response directory.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExtractionReport {
    /// Fragments written, ascending by index.
    pub fragments: Vec<Fragment>,
    /// Indices whose reply had no fenced block.
    pub missing: Vec<u32>,
    /// Per-record failures (unreadable records, write errors, missing fences).
    pub failures: Vec<PageError>,
    /// Path of the combined document, when one was written.
    pub combined_path: Option<PathBuf>,
}

impl ExtractionReport {
    /// `true` when at least one fragment was produced.
    pub fn is_success(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Indices of the fragments written.
    pub fn indices(&self) -> Vec<u32> {
        self.fragments.iter().map(|f| f.index).collect()
    }
}

/// Result of running all three stages over one PDF.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// The PDF (path or URL) that was processed.
    pub input: String,
    /// Directory holding every artifact for this document.
    pub img_dir: PathBuf,
    /// Pages rendered.
    pub rendered: usize,
    /// Annotation stage report; `None` when rendering produced nothing.
    pub annotation: Option<AnnotationReport>,
    /// Extraction stage report; `None` when annotation produced nothing.
    pub extraction: Option<ExtractionReport>,
}

impl DocumentReport {
    /// `true` when every stage produced at least one artifact.
    pub fn is_success(&self) -> bool {
        self.rendered > 0
            && self.annotation.as_ref().is_some_and(AnnotationReport::is_success)
            && self.extraction.as_ref().is_some_and(ExtractionReport::is_success)
    }
}

/// Result of processing every PDF in a batch directory.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    /// One report per PDF that got past its fatal preconditions.
    pub documents: Vec<DocumentReport>,
    /// PDFs that failed fatally, with the error message.
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchReport {
    /// `true` when at least one document went through every stage.
    pub fn is_success(&self) -> bool {
        self.documents.iter().any(DocumentReport::is_success)
    }
}
