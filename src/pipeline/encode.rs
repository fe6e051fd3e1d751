//! Image transport encoding: `DynamicImage` → base64 PNG.
//!
//! Every image is canonicalised to 8-bit RGB before encoding, whatever it was
//! loaded as (RGBA, greyscale, palette GIF, 16-bit PNG). The model API then
//! always receives the same transport format: an opaque RGB PNG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Media type of every encoded page.
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// A page image ready to embed in a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// MIME type of the decoded bytes.
    pub media_type: &'static str,
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
}

/// Convert to 8-bit, 3-channel RGB, dropping any alpha channel.
///
/// Images already in `Rgb8` are returned unchanged.
pub fn canonicalize(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Canonicalise and encode a page image as base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<EncodedImage, image::ImageError> {
    let rgb = match img {
        DynamicImage::ImageRgb8(_) => std::borrow::Cow::Borrowed(img),
        other => std::borrow::Cow::Owned(canonicalize(other.clone())),
    };

    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        rgb.width(),
        rgb.height(),
        data.len()
    );

    Ok(EncodedImage {
        media_type: PNG_MEDIA_TYPE,
        data,
    })
}
