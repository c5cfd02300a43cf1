//! Page image loading, validation and encoding.

use crate::core::LayoutError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Smallest accepted page side, in pixels.
pub const MIN_PAGE_SIZE: u32 = 8;

/// Loads an image from disk as RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, LayoutError> {
    let img = image::open(path).map_err(LayoutError::ImageLoad)?;
    Ok(img.to_rgb8())
}

/// Decodes an in-memory image as a page.
///
/// Decoding failures and pages below [`MIN_PAGE_SIZE`] are malformed input.
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<RgbImage, LayoutError> {
    if bytes.is_empty() {
        return Err(LayoutError::malformed_input("empty image data"));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|e| LayoutError::malformed_input(format!("failed to decode image: {e}")))?
        .to_rgb8();
    validate_page_size(&img)?;
    Ok(img)
}

/// Rejects pages with a zero or tiny side.
pub fn validate_page_size(image: &RgbImage) -> Result<(), LayoutError> {
    let (w, h) = image.dimensions();
    if w < MIN_PAGE_SIZE || h < MIN_PAGE_SIZE {
        return Err(LayoutError::malformed_input(format!(
            "page is {w}x{h}, minimum is {MIN_PAGE_SIZE}x{MIN_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Encodes an image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, LayoutError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(LayoutError::ImageLoad)?;
    Ok(buffer.into_inner())
}

/// Encodes an image as base64 PNG.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, LayoutError> {
    Ok(STANDARD.encode(encode_png(image)?))
}
