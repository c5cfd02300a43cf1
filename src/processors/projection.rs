//! Projection profiles over one axis of a set of boxes.
//!
//! A projection histogram counts, for each integer coordinate along an axis,
//! how many boxes cover it. Runs of zeros are gaps no box crosses; gaps wider
//! than a threshold separate columns (x-axis) or bands (y-axis).

use super::geometry::BoundingBox;

/// Axis along which to project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Project onto the x-axis (column detection).
    X,
    /// Project onto the y-axis (band detection).
    Y,
}

/// A covered half-open interval `[start, end)` of a projection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First covered coordinate.
    pub start: usize,
    /// One past the last covered coordinate.
    pub end: usize,
}

impl Segment {
    /// Returns true if `value` lies within the segment.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.start as f32 && value <= self.end as f32
    }
}

/// Builds the projection histogram of `boxes` along `axis`.
///
/// Coordinates are floored/ceiled to whole pixels; negative coordinates are
/// clipped to zero.
pub fn projection_by_bboxes(boxes: &[BoundingBox], axis: Axis) -> Vec<u32> {
    let extent = |b: &BoundingBox| match axis {
        Axis::X => (b.x0, b.x1),
        Axis::Y => (b.y0, b.y1),
    };

    let max_length = boxes
        .iter()
        .map(|b| extent(b).1.max(0.0).ceil() as usize)
        .max()
        .unwrap_or(0);
    if max_length == 0 {
        return Vec::new();
    }

    let mut projection = vec![0u32; max_length];
    for b in boxes {
        let (lo, hi) = extent(b);
        let start = lo.max(0.0).floor() as usize;
        let end = (hi.max(0.0).ceil() as usize).min(max_length);
        for slot in projection.iter_mut().take(end).skip(start) {
            *slot += 1;
        }
    }
    projection
}

/// Splits a projection profile into covered segments.
///
/// Positions whose count exceeds `min_value` are significant; two significant
/// runs are separate segments only when the empty gap between them is wider
/// than `min_gap`. Returns an empty vector for an all-empty profile.
pub fn split_projection_profile(values: &[u32], min_value: u32, min_gap: f32) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for (idx, _) in values.iter().enumerate().filter(|(_, v)| **v > min_value) {
        match segments.last_mut() {
            Some(last) if idx == last.end => last.end = idx + 1,
            Some(last) if ((idx - last.end) as f32) <= min_gap => last.end = idx + 1,
            _ => segments.push(Segment {
                start: idx,
                end: idx + 1,
            }),
        }
    }
    segments
}
