//! Pipeline stages for PDF-to-HTML conversion.
//!
//! Each stage reads the previous stage's artifacts from disk and writes its
//! own, so any stage can be rerun on its own. Stages agree only on the file
//! naming contract in [`crate::naming`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ discover ──▶ encode ──▶ llm ──▶ extract ──▶ assemble
//! (URL/path) (pdfium)  (p{n}.png)   (base64)   (VLM)   (fences)   (combined)
//! ```
//!
//! 1. [`input`]    : canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]   : rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`discover`] : find `p{n}.*` artifacts in a directory, ordered by index
//! 4. [`encode`]   : canonicalise to RGB, PNG-encode and base64-wrap
//! 5. [`llm`]      : the vision-model boundary; the only network I/O
//! 6. [`annotate`] : one model call and one `p{n}.json` per page image
//! 7. [`extract`]  : pull the fenced block out of each reply into `p{n}.html`
//! 8. [`assemble`] : join fragments into the combined document

pub mod annotate;
pub mod assemble;
pub mod discover;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod render;

use std::ffi::OsString;
use std::path::Path;

/// Write `bytes` to `path` atomically: write a sibling temp file, then rename.
///
/// Readers never observe a half-written artifact, and an interrupted run
/// leaves at most a stray `*.tmp` file behind.
pub(crate) async fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
