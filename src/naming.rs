//! The page-file naming contract shared by every stage.
//!
//! Stages never talk to each other directly; they only agree on file names.
//! A page index `n` (1-based, document order) is written as `p{n}.{ext}` by
//! whichever stage produces the artifact, and parsed back by whichever stage
//! consumes it:
//!
//! | Artifact          | Name         |
//! |-------------------|--------------|
//! | Page image        | `p{n}.png`   |
//! | Response record   | `p{n}.json`  |
//! | Fragment          | `p{n}.html`  |
//!
//! There is exactly one grammar, `p<digits>` optionally followed by a single
//! `.<ext>`, and it lives here so the producer and consumer sides cannot
//! drift apart.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal prefix in front of the page number.
pub const PAGE_PREFIX: &str = "p";

/// Extension of response records written by the annotator.
pub const RESPONSE_EXTENSION: &str = "json";

static RE_PAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^p(\d+)(?:\.([A-Za-z0-9]+))?$").unwrap());

/// A file name split into its page index and (optional) extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFile<'a> {
    pub index: u32,
    pub extension: Option<&'a str>,
}

/// Parse a file name against the `p<digits>[.<ext>]` grammar.
///
/// Only the final path component is considered. Returns `None` for names
/// outside the grammar, for index 0, and for indices that overflow `u32`.
pub fn parse_page_file(file_name: &str) -> Option<PageFile<'_>> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let caps = RE_PAGE_FILE.captures(name)?;
    let index: u32 = caps.get(1)?.as_str().parse().ok()?;
    if index == 0 {
        return None;
    }
    Some(PageFile {
        index,
        extension: caps.get(2).map(|m| m.as_str()),
    })
}

/// Recover the page index from a file name, see [`parse_page_file`].
pub fn parse_page_index(file_name: &str) -> Option<u32> {
    parse_page_file(file_name).map(|f| f.index)
}

/// `p{index}.{ext}`
pub fn page_file_name(index: u32, extension: &str) -> String {
    format!("{PAGE_PREFIX}{index}.{extension}")
}

/// `p{index}.json`
pub fn response_file_name(index: u32) -> String {
    page_file_name(index, RESPONSE_EXTENSION)
}
