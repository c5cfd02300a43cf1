//! Debug rendering of ordered regions.
//!
//! Draws each region's box in a per-label colour and connects region centres
//! in reading order, so column and nesting decisions can be checked by eye.

use crate::domain::{ClassLabel, OrderedRegion};
use crate::processors::BoundingBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const PATH_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BBOX_THICKNESS: i32 = 2;
const MARKER_SIZE: u32 = 6;

fn label_color(label: ClassLabel) -> Rgb<u8> {
    match label {
        ClassLabel::Title => Rgb([200, 0, 200]),
        ClassLabel::Paragraph => Rgb([0, 160, 0]),
        ClassLabel::Table => Rgb([0, 0, 230]),
        ClassLabel::TableCell => Rgb([100, 160, 255]),
        ClassLabel::Figure => Rgb([230, 140, 0]),
        ClassLabel::Caption => Rgb([150, 100, 0]),
        ClassLabel::ListItem => Rgb([0, 170, 170]),
        ClassLabel::Header | ClassLabel::Footer => Rgb([128, 128, 128]),
    }
}

fn bbox_to_rect(bbox: &BoundingBox) -> Option<Rect> {
    let width = bbox.width().round() as u32;
    let height = bbox.height().round() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect::at(bbox.x0.round() as i32, bbox.y0.round() as i32).of_size(width, height))
}

/// Returns a copy of `image` with `ordered` drawn on top.
///
/// Regions are visited by `reading_order`. Top-level regions are joined by
/// the reading path; each region also gets a marker at its top-left corner.
pub fn draw_regions(image: &RgbImage, ordered: &[OrderedRegion]) -> RgbImage {
    let mut canvas = image.clone();
    let mut regions: Vec<&OrderedRegion> = ordered.iter().collect();
    regions.sort_by_key(|r| r.reading_order);

    for region in &regions {
        let color = label_color(region.region.class_label);
        let Some(rect) = bbox_to_rect(&region.region.bbox) else {
            continue;
        };
        for t in 0..BBOX_THICKNESS {
            let thick = Rect::at(rect.left() + t, rect.top() + t).of_size(
                rect.width().saturating_sub(2 * t as u32).max(1),
                rect.height().saturating_sub(2 * t as u32).max(1),
            );
            draw_hollow_rect_mut(&mut canvas, thick, color);
        }
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(rect.left(), rect.top()).of_size(MARKER_SIZE, MARKER_SIZE),
            color,
        );
    }

    let centres: Vec<(f32, f32)> = regions
        .iter()
        .filter(|r| r.parent_id.is_none())
        .map(|r| {
            let c = r.region.bbox.center();
            (c.x, c.y)
        })
        .collect();
    for pair in centres.windows(2) {
        draw_line_segment_mut(&mut canvas, pair[0], pair[1], PATH_COLOR);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Detection, Region};

    fn ordered(id: &str, bbox: BoundingBox, label: ClassLabel, order: usize) -> OrderedRegion {
        OrderedRegion {
            region: Region::from_detection(Detection::new(id, bbox, label, 0.9, "m", 0)),
            reading_order: order,
            parent_id: None,
            column_index: Some(0),
        }
    }

    #[test]
    fn test_boxes_and_path_are_drawn() {
        let page = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let regions = vec![
            ordered("a", BoundingBox::from_coords(10.0, 10.0, 40.0, 30.0), ClassLabel::Title, 0),
            ordered(
                "b",
                BoundingBox::from_coords(10.0, 60.0, 90.0, 90.0),
                ClassLabel::Paragraph,
                1,
            ),
        ];
        let out = draw_regions(&page, &regions);
        assert_eq!(out.dimensions(), page.dimensions());
        assert_eq!(out.get_pixel(10, 10), &label_color(ClassLabel::Title));
        assert_eq!(out.get_pixel(89, 89), &label_color(ClassLabel::Paragraph));
        // Centre of the first region lies on the reading path.
        assert_eq!(out.get_pixel(25, 20), &PATH_COLOR);
        // Input image untouched.
        assert_eq!(page.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_degenerate_box_skipped() {
        let page = RgbImage::new(20, 20);
        let regions = vec![ordered(
            "a",
            BoundingBox::from_coords(5.0, 5.0, 5.2, 15.0),
            ClassLabel::Paragraph,
            0,
        )];
        let out = draw_regions(&page, &regions);
        assert_eq!(out, page);
    }
}
