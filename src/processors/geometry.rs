//! Geometric primitives for layout analysis.
//!
//! Regions on a page are axis-aligned rectangles in page-pixel coordinates.
//! This module provides the box type together with the overlap measures
//! (intersection, IoU, IoA) and the rectangle subtraction used when
//! resolving conflicting regions.

use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// An axis-aligned bounding box `(x0, y0)-(x1, y1)` with `x0 <= x1`, `y0 <= y1`.
///
/// Serialized as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub y0: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub y1: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from(c: [f32; 4]) -> Self {
        BoundingBox::from_coords(c[0], c[1], c[2], c[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

impl BoundingBox {
    /// Creates a bounding box from two corners, normalizing their order.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x0: x1.min(x2),
            y0: y1.min(y2),
            x1: x1.max(x2),
            y1: y1.max(y2),
        }
    }

    /// Creates a bounding box from its top-left corner and size.
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::from_coords(x, y, x + w, y + h)
    }

    /// Creates a box covering a whole `width` x `height` page.
    pub fn page(width: u32, height: u32) -> Self {
        Self::from_coords(0.0, 0.0, width as f32, height as f32)
    }

    /// Minimum x-coordinate.
    #[inline]
    pub fn x_min(&self) -> f32 {
        self.x0
    }

    /// Minimum y-coordinate.
    #[inline]
    pub fn y_min(&self) -> f32 {
        self.y0
    }

    /// Maximum x-coordinate.
    #[inline]
    pub fn x_max(&self) -> f32 {
        self.x1
    }

    /// Maximum y-coordinate.
    #[inline]
    pub fn y_max(&self) -> f32 {
        self.y1
    }

    /// Width of the box.
    #[inline]
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    /// Height of the box.
    #[inline]
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    /// Area of the box.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns true if the box has strictly positive width and height.
    pub fn is_valid(&self) -> bool {
        self.x0.is_finite()
            && self.y0.is_finite()
            && self.x1.is_finite()
            && self.y1.is_finite()
            && self.x1 > self.x0
            && self.y1 > self.y0
    }

    /// Center point of the box.
    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Returns the box clipped to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }

    /// Computes the intersection rectangle, if any.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(BoundingBox { x0, y0, x1, y1 })
    }

    /// Computes the area of intersection between this bounding box and another.
    ///
    /// Returns 0.0 if there is no intersection.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        self.intersection(other).map_or(0.0, |b| b.area())
    }

    /// Computes the Intersection over Union (IoU) between this bounding box and another.
    ///
    /// Returns a value between 0.0 and 1.0; 0.0 if there is no intersection.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_area = self.intersection_area(other);
        if inter_area <= 0.0 {
            return 0.0;
        }
        let union_area = self.area() + other.area() - inter_area;
        if union_area <= 0.0 {
            return 0.0;
        }
        inter_area / union_area
    }

    /// Computes the Intersection over Area (IoA) of this bounding box with another.
    ///
    /// IoA = intersection_area / self_area, i.e. the fraction of this box
    /// that lies inside `other`.
    pub fn ioa(&self, other: &BoundingBox) -> f32 {
        let inter_area = self.intersection_area(other);
        let self_area = self.area();
        if inter_area <= 0.0 || self_area <= 0.0 {
            return 0.0;
        }
        inter_area / self_area
    }

    /// Intersection area divided by the area of the smaller box.
    ///
    /// This is the overlap measure used for the non-overlap tolerance: it is
    /// 1.0 when one box contains the other regardless of their size ratio.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let inter_area = self.intersection_area(other);
        let min_area = self.area().min(other.area());
        if inter_area <= 0.0 || min_area <= 0.0 {
            return 0.0;
        }
        inter_area / min_area
    }

    /// Computes the union (minimum enclosing box) of this bounding box and another.
    pub fn union(&self, other: &Self) -> Self {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Returns true if the two boxes share any vertical extent.
    pub fn overlaps_vertically(&self, other: &BoundingBox) -> bool {
        self.y0.max(other.y0) < self.y1.min(other.y1)
    }

    /// Returns true if the two boxes share any horizontal extent.
    pub fn overlaps_horizontally(&self, other: &BoundingBox) -> bool {
        self.x0.max(other.x0) < self.x1.min(other.x1)
    }

    /// Removes `other` from this box, keeping the largest remaining rectangle.
    ///
    /// The candidates are the four slabs of `self` that lie strictly left of,
    /// right of, above and below `other`. Returns `None` when `self` is covered
    /// entirely. When the boxes do not intersect, `self` is returned unchanged.
    pub fn subtract(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if self.intersection(other).is_none() {
            return Some(*self);
        }

        let candidates = [
            BoundingBox {
                x1: other.x0.min(self.x1),
                ..*self
            },
            BoundingBox {
                x0: other.x1.max(self.x0),
                ..*self
            },
            BoundingBox {
                y1: other.y0.min(self.y1),
                ..*self
            },
            BoundingBox {
                y0: other.y1.max(self.y0),
                ..*self
            },
        ];

        // Ties keep the earliest candidate so results are deterministic.
        candidates
            .into_iter()
            .filter(|c| c.is_valid())
            .fold(None, |best: Option<BoundingBox>, c| match best {
                Some(b) if b.area() >= c.area() => Some(b),
                _ => Some(c),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_x_max_y_max() {
        let bbox = BoundingBox::from_coords(100.0, 80.0, 10.0, 20.0);
        assert_eq!(bbox.x_min(), 10.0);
        assert_eq!(bbox.y_min(), 20.0);
        assert_eq!(bbox.x_max(), 100.0);
        assert_eq!(bbox.y_max(), 80.0);
    }

    #[test]
    fn test_bounding_box_iou() {
        let bbox1 = BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0);
        let bbox2 = BoundingBox::from_coords(5.0, 5.0, 15.0, 15.0);

        // Intersection 25, union 175.
        let iou = bbox1.iou(&bbox2);
        assert!((iou - 0.1428).abs() < 0.01, "IoU: {}", iou);

        let iou_same = bbox1.iou(&bbox1);
        assert!((iou_same - 1.0).abs() < 0.001, "IoU same: {}", iou_same);

        let bbox3 = BoundingBox::from_coords(20.0, 20.0, 30.0, 30.0);
        assert_eq!(bbox1.iou(&bbox3), 0.0);
    }

    #[test]
    fn test_paragraph_pair_iou_above_half() {
        let a = BoundingBox::from_coords(0.0, 0.0, 100.0, 50.0);
        let b = BoundingBox::from_coords(10.0, 5.0, 110.0, 55.0);
        let iou = a.iou(&b);
        assert!((iou - 4050.0 / 5950.0).abs() < 1e-4, "IoU: {}", iou);
        assert!(iou > 0.5);
    }

    #[test]
    fn test_ioa_and_overlap_ratio() {
        let cell = BoundingBox::from_coords(10.0, 10.0, 20.0, 20.0);
        let table = BoundingBox::from_coords(0.0, 0.0, 100.0, 100.0);
        assert!((cell.ioa(&table) - 1.0).abs() < 1e-6);
        assert!((table.ioa(&cell) - 0.01).abs() < 1e-6);
        assert!((table.overlap_ratio(&cell) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_subtract_keeps_largest_remainder() {
        // Figure covers the right 30px of the paragraph.
        let paragraph = BoundingBox::from_coords(0.0, 0.0, 100.0, 40.0);
        let figure = BoundingBox::from_coords(70.0, 0.0, 200.0, 200.0);
        let rest = paragraph.subtract(&figure).unwrap();
        assert_eq!(rest, BoundingBox::from_coords(0.0, 0.0, 70.0, 40.0));
        assert_eq!(rest.intersection_area(&figure), 0.0);
    }

    #[test]
    fn test_subtract_fully_covered_is_none() {
        let inner = BoundingBox::from_coords(10.0, 10.0, 20.0, 20.0);
        let outer = BoundingBox::from_coords(0.0, 0.0, 30.0, 30.0);
        assert!(inner.subtract(&outer).is_none());
    }

    #[test]
    fn test_subtract_disjoint_is_identity() {
        let a = BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_coords(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.subtract(&b), Some(a));
    }

    #[test]
    fn test_serde_as_array() {
        let b = BoundingBox::from_coords(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
