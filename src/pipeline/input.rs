//! Renderer input: turn a user-supplied path or URL into a local PDF path.
//!
//! pdfium opens files by path, so URL inputs are downloaded into a `TempDir`
//! that lives exactly as long as the returned [`ResolvedInput`]. Both kinds
//! of input are checked for the `%PDF` magic bytes before the renderer sees
//! them, which turns "not a PDF" into a precise error instead of an opaque
//! pdfium failure.

use crate::error::Pdf2HtmlError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF lives in `_temp_dir` until this is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2HtmlError> {
    if input.trim().is_empty() {
        return Err(Pdf2HtmlError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Validate a local file: it must exist, be readable, and start with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2HtmlError> {
    let path = path.to_path_buf();
    if !path.is_file() {
        return Err(Pdf2HtmlError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2HtmlError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2HtmlError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    let read = file
        .read(&mut magic)
        .map_err(|source| Pdf2HtmlError::ReadFailed {
            path: path.clone(),
            source,
        })?;
    if read < magic.len() || &magic != PDF_MAGIC {
        return Err(Pdf2HtmlError::NotAPdf { path, magic });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL into a temporary directory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2HtmlError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2HtmlError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|_| Pdf2HtmlError::InvalidInput {
        input: url.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(parsed.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2HtmlError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2HtmlError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(file_name_from_url(&parsed));

    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(Pdf2HtmlError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
            path: file_path.clone(),
            source,
        })?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn file_name_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
