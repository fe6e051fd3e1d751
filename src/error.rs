//! Error types for the edgequake-pdf2html library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2HtmlError`]: **Fatal**: the stage cannot start at all (missing
//!   input file or directory, missing credential, unwritable output). Returned
//!   as `Err(Pdf2HtmlError)` from every stage entry point, before any output
//!   for that stage is written.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed (rasterisation
//!   glitch, transport error, no fenced block in the reply) but the rest of
//!   the batch is fine. Collected in the stage reports in [`crate::output`].
//!
//! A stage that finishes with zero artifacts is neither: it returns `Ok` with
//! a report whose `is_success()` is `false`, and the caller decides.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2html library.
#[derive(Debug, Error)]
pub enum Pdf2HtmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A stage input directory does not exist.
    #[error("Directory not found: '{path}'")]
    DirectoryNotFound { path: PathBuf },

    /// The image directory holds no page image the annotator can use.
    #[error("No page images (p<N>.png, p<N>.jpg, …) found in '{path}'")]
    NoImagesFound { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No credential was supplied for the vision model.
    #[error("No API key configured for '{provider}'.\n{hint}")]
    MissingCredential { provider: String, hint: String },

    /// The prompt resolved to an empty string.
    #[error("The prompt is empty; provide one with --prompt-file or use the built-in default")]
    EmptyPrompt,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a stage output path.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a stage input path.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, then either:\n\
  • put it on the system library path, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored in the stage reports; the stage always continues with the next page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation or image write failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// A discovered image file could not be decoded.
    #[error("Image '{file}' could not be loaded: {detail}")]
    ImageUnreadable { file: String, detail: String },

    /// Transport encoding of the page image failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: u32, detail: String },

    /// The vision model call failed (after `retries` retries).
    #[error("Page {page}: model call failed after {retries} retries: {detail}")]
    ModelFailed {
        page: u32,
        retries: u32,
        detail: String,
    },

    /// A per-page artifact could not be written.
    #[error("Page {page}: failed to write '{file}': {detail}")]
    WriteFailed {
        page: u32,
        file: String,
        detail: String,
    },

    /// A response record could not be read or parsed.
    #[error("Response record '{file}' is unreadable: {detail}")]
    RecordUnreadable { file: String, detail: String },

    /// The reply held no fenced markup block.
    #[error("Page {page}: no fenced block found in '{file}'")]
    FenceNotFound { page: u32, file: String },
}

impl PageError {
    /// The page index this error refers to, when it is known.
    pub fn page(&self) -> Option<u32> {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::ModelFailed { page, .. }
            | PageError::WriteFailed { page, .. }
            | PageError::FenceNotFound { page, .. } => Some(*page),
            PageError::ImageUnreadable { .. } | PageError::RecordUnreadable { .. } => None,
        }
    }
}
