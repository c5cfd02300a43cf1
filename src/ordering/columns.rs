//! Band and column partitioning of a page's independent regions.
//!
//! Full-width regions split the page into horizontal bands; each band is
//! split into columns at x-projection gaps no region crosses.

use crate::processors::{Axis, BoundingBox, Segment, projection_by_bboxes, split_projection_profile};

/// Position of a region in the page's band/column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Index into the caller's region slice.
    pub index: usize,
    /// Column within the band; `None` for full-width separators.
    pub column: Option<usize>,
}

/// Result of laying out one set of regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ColumnLayout {
    pub placements: Vec<Placement>,
    /// Bands with side-by-side regions that could not be split into columns.
    pub unsplit_bands: usize,
}

/// Sort key for top-to-bottom, then left-to-right, then input order.
fn reading_key(boxes: &[BoundingBox], i: usize) -> (f32, f32, usize) {
    (boxes[i].y0, boxes[i].x0, i)
}

pub(crate) fn sort_top_down(boxes: &[BoundingBox], indices: &mut [usize]) {
    indices.sort_by(|&a, &b| {
        let (ka, kb) = (reading_key(boxes, a), reading_key(boxes, b));
        ka.0.total_cmp(&kb.0)
            .then(ka.1.total_cmp(&kb.1))
            .then(ka.2.cmp(&kb.2))
    });
}

/// Orders `indices` (into `boxes`) band by band, column by column.
pub(crate) fn layout_columns(
    boxes: &[BoundingBox],
    indices: &[usize],
    page_width: f32,
    full_width_fraction: f32,
    column_gap: f32,
) -> ColumnLayout {
    let full_width = full_width_fraction * page_width;
    let (mut separators, body): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| boxes[i].width() >= full_width);
    sort_top_down(boxes, &mut separators);

    // Band k holds the body regions whose centre lies below k separators.
    let mut bands: Vec<Vec<usize>> = vec![Vec::new(); separators.len() + 1];
    for &i in &body {
        let cy = boxes[i].center().y;
        let band = separators
            .iter()
            .filter(|&&s| boxes[s].center().y <= cy)
            .count();
        bands[band].push(i);
    }

    let mut layout = ColumnLayout::default();
    for (k, band) in bands.iter().enumerate() {
        if !band.is_empty() {
            let (placements, split) = layout_band(boxes, band, column_gap);
            layout.placements.extend(placements);
            if !split {
                layout.unsplit_bands += 1;
            }
        }
        if let Some(&separator) = separators.get(k) {
            layout.placements.push(Placement {
                index: separator,
                column: None,
            });
        }
    }
    layout
}

/// Orders one band; returns `false` as second value when side-by-side
/// regions exist but no column gap qualified.
fn layout_band(boxes: &[BoundingBox], band: &[usize], column_gap: f32) -> (Vec<Placement>, bool) {
    let band_boxes: Vec<BoundingBox> = band.iter().map(|&i| boxes[i]).collect();
    let profile = projection_by_bboxes(&band_boxes, Axis::X);
    let segments = split_projection_profile(&profile, 0, column_gap);

    if segments.len() <= 1 {
        let mut order = band.to_vec();
        sort_top_down(boxes, &mut order);
        let placements = order
            .into_iter()
            .map(|index| Placement {
                index,
                column: Some(0),
            })
            .collect();
        return (placements, !has_side_by_side(&band_boxes));
    }

    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); segments.len()];
    for &i in band {
        columns[column_of(&segments, &boxes[i])].push(i);
    }

    let mut placements = Vec::with_capacity(band.len());
    for (column, mut members) in columns.into_iter().enumerate() {
        sort_top_down(boxes, &mut members);
        placements.extend(members.into_iter().map(|index| Placement {
            index,
            column: Some(column),
        }));
    }
    (placements, true)
}

fn column_of(segments: &[Segment], bbox: &BoundingBox) -> usize {
    let cx = bbox.center().x;
    segments
        .iter()
        .position(|s| s.contains(cx))
        .unwrap_or_else(|| {
            // Centre fell in a bridged gap: use the closest segment.
            segments
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let d = if cx < s.start as f32 {
                        s.start as f32 - cx
                    } else {
                        cx - s.end as f32
                    };
                    (i, d)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
}

fn has_side_by_side(boxes: &[BoundingBox]) -> bool {
    boxes.iter().enumerate().any(|(i, a)| {
        boxes[i + 1..]
            .iter()
            .any(|b| a.overlaps_vertically(b) && !a.overlaps_horizontally(b))
    })
}
