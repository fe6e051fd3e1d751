//! Stage input discovery: find the per-page artifacts in a directory.
//!
//! Directory listings come back in no particular order, so discovery never
//! trusts them: every file name is parsed with [`crate::naming`], files
//! outside the grammar are dropped, and the result is sorted by page index.

use crate::error::{PageError, Pdf2HtmlError};
use crate::naming::{parse_page_file, RESPONSE_EXTENSION};
use crate::output::PageImage;
use crate::pipeline::encode::canonicalize;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Raster formats the annotator accepts, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// List `dir` and keep one file per page index whose extension passes `accept`.
///
/// When two names map to the same index (`p1.png` and `p01.png`, or
/// `p1.png` and `p1.jpg`) the lexicographically first name wins.
pub(crate) fn list_page_files(
    dir: &Path,
    accept: impl Fn(&str) -> bool,
) -> Result<Vec<(u32, PathBuf)>, Pdf2HtmlError> {
    if !dir.is_dir() {
        return Err(Pdf2HtmlError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let read_failed = |source| Pdf2HtmlError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    };

    let mut names: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        // `Path::is_file` follows symlinks; `DirEntry::file_type` does not.
        if !entry.path().is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut by_index: BTreeMap<u32, PathBuf> = BTreeMap::new();
    for name in names {
        let Some(file) = parse_page_file(&name) else {
            debug!("Ignoring '{}': not a p<N> page file", name);
            continue;
        };
        if !file.extension.is_some_and(&accept) {
            debug!("Ignoring '{}': unsupported extension", name);
            continue;
        }
        if let Some(kept) = by_index.get(&file.index) {
            warn!(
                "Page {}: '{}' duplicates '{}', skipping",
                file.index,
                name,
                kept.display()
            );
            continue;
        }
        by_index.insert(file.index, dir.join(&name));
    }

    Ok(by_index.into_iter().collect())
}

/// Whether `ext` is one of [`IMAGE_EXTENSIONS`].
pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

/// Find the page images in `dir`, ascending by index.
///
/// Only names and extensions are checked here. Decoding happens per page in
/// [`load_page_image`], right before the page is sent, so at most
/// `concurrency` bitmaps are alive at once.
///
/// # Errors
/// [`Pdf2HtmlError::DirectoryNotFound`] when `dir` does not exist.
pub fn discover_images(dir: &Path) -> Result<Vec<PageImage>, Pdf2HtmlError> {
    let pages: Vec<PageImage> = list_page_files(dir, is_image_extension)?
        .into_iter()
        .map(|(index, path)| PageImage { index, path })
        .collect();

    info!("Found {} page images in '{}'", pages.len(), dir.display());
    Ok(pages)
}

/// Decode a page image and canonicalise it to RGB8.
///
/// The format is sniffed from the content rather than the name.
pub(crate) fn load_page_image(page: &PageImage) -> Result<DynamicImage, PageError> {
    let unreadable = |detail: String| {
        let file = page.path.display().to_string();
        warn!("Error loading image {}: {}", file, detail);
        PageError::ImageUnreadable { file, detail }
    };

    let img = image::ImageReader::open(&page.path)
        .map_err(|e| unreadable(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| unreadable(e.to_string()))?
        .decode()
        .map_err(|e| unreadable(e.to_string()))?;
    Ok(canonicalize(img))
}

/// Find the response records (`p{n}.json`) in `dir`, ascending by index.
///
/// # Errors
/// [`Pdf2HtmlError::DirectoryNotFound`] when `dir` does not exist.
pub fn discover_responses(dir: &Path) -> Result<Vec<(u32, PathBuf)>, Pdf2HtmlError> {
    let files = list_page_files(dir, |ext| ext.eq_ignore_ascii_case(RESPONSE_EXTENSION))?;
    debug!("Found {} response records in '{}'", files.len(), dir.display());
    Ok(files)
}
