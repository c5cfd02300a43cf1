//! Bounding box based image cropping utilities.

use crate::core::TranscriptionError;
use crate::processors::BoundingBox;
use image::{RgbImage, imageops};

/// Bounding box based image cropping utilities.
pub struct BBoxCrop;

impl BBoxCrop {
    /// Crops the pixel rectangle covering `bbox` grown by `padding`.
    ///
    /// The rectangle is clipped to the image; if nothing remains the crop
    /// fails with [`TranscriptionError::EmptyCrop`] carrying the clipped size.
    pub fn crop_bounding_box(
        image: &RgbImage,
        bbox: &BoundingBox,
        padding: u32,
    ) -> Result<RgbImage, TranscriptionError> {
        let (x1, y1, x2, y2) = Self::pixel_rect(image, bbox, padding);
        if x2 <= x1 || y2 <= y1 {
            return Err(TranscriptionError::EmptyCrop {
                width: x2.saturating_sub(x1),
                height: y2.saturating_sub(y1),
            });
        }
        Ok(Self::slice_rgb_image(image, (x1, y1, x2, y2)))
    }

    /// Integer `(x1, y1, x2, y2)` covering the box, clipped to the image.
    fn pixel_rect(image: &RgbImage, bbox: &BoundingBox, padding: u32) -> (u32, u32, u32, u32) {
        let pad = padding as f32;
        let (w, h) = (image.width() as f32, image.height() as f32);
        let clip = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
        let x1 = clip((bbox.x0 - pad).floor(), w) as u32;
        let y1 = clip((bbox.y0 - pad).floor(), h) as u32;
        let x2 = clip((bbox.x1 + pad).ceil(), w) as u32;
        let y2 = clip((bbox.y1 + pad).ceil(), h) as u32;
        (x1, y1, x2, y2)
    }

    fn slice_rgb_image(img: &RgbImage, coords: (u32, u32, u32, u32)) -> RgbImage {
        let (x1, y1, x2, y2) = coords;
        imageops::crop_imm(img, x1, y1, x2 - x1, y2 - y1).to_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn test_image() -> RgbImage {
        RgbImage::from_fn(100, 50, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn test_crop_covers_fractional_box() {
        let bbox = BoundingBox::from_coords(10.4, 5.6, 20.2, 15.0);
        let crop = BBoxCrop::crop_bounding_box(&test_image(), &bbox, 0).unwrap();
        assert_eq!(crop.dimensions(), (11, 10));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([10, 5, 0]));
    }

    #[test]
    fn test_padding_is_clipped_to_image() {
        let bbox = BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0);
        let crop = BBoxCrop::crop_bounding_box(&test_image(), &bbox, 4).unwrap();
        assert_eq!(crop.dimensions(), (14, 14));
    }

    #[test]
    fn test_box_outside_image_is_empty_crop() {
        let bbox = BoundingBox::from_coords(120.0, 10.0, 140.0, 20.0);
        let err = BBoxCrop::crop_bounding_box(&test_image(), &bbox, 0).unwrap_err();
        assert_eq!(
            err,
            TranscriptionError::EmptyCrop {
                width: 0,
                height: 10
            }
        );
    }
}
